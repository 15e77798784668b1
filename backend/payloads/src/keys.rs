//! Well-known domain keys.
//!
//! Any non-empty string is a valid key; these are the ones the POS screens react to.

pub const GLOBAL: &str = "global";
pub const SETTINGS: &str = "settings";
pub const PERMISSIONS: &str = "permissions";
pub const USERS: &str = "users";
pub const MENU: &str = "menu";
pub const INVENTORY: &str = "inventory";
pub const ORDERS: &str = "orders";
