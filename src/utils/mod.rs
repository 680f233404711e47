pub mod locks;
pub mod shuffle;
pub mod time;
pub mod validation;
