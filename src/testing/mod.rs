//! Testing infrastructure: an in-memory `ItemSource` with scripted behavior.

pub mod mock_source;

pub use mock_source::MockItemSource;
