pub mod fields;
pub mod gallery;
pub mod observable;
pub mod url;

pub use fields::*;
pub use gallery::*;
pub use observable::*;
pub use url::*;
