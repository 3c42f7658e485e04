/// A registration attempt succeeded and the report was written.
pub const SUCCESS: u8 = 0;
/// Every attempt failed, or the report could not be written.
pub const FAILED: u8 = 1;
/// Configuration could not be loaded or validated; nothing was attempted.
pub const CONFIG: u8 = 2;
