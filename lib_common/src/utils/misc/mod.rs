/// General helpers (timestamps).
pub mod utils;
