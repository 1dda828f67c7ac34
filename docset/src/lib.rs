pub mod error;
pub mod options;
pub mod path_template;
pub mod record;
pub mod store;
pub mod view;

pub use error::{DocsetError, Result};
pub use options::Options;
pub use record::Key;
pub use store::Registry;
pub use view::{Collation, Op, SortOrder, View};
