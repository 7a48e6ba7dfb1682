pub mod formatters;
pub mod input;
pub mod logging;
pub mod redaction;
#[cfg(test)]
pub mod test_utils;
pub mod url;
