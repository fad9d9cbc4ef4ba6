pub mod identifier_loader;

pub use identifier_loader::{load_identifiers, parse_identifiers};
