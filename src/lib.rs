pub mod browser;
pub mod config;
pub mod error;
pub mod exit_codes;
pub mod probe;
pub mod reasoner;

#[cfg(test)]
mod test_support;
