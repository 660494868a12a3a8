mod store;

pub use store::{StoreError, load_world, save_world};
