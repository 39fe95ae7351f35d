pub mod constants;
pub mod encoding;
pub mod fees;
#[cfg(test)]
pub mod test_utils;
