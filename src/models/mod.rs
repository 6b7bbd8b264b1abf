pub mod adjustment;
pub mod inventory;
