pub mod messaging;
pub mod node;
pub mod util;

#[cfg(test)]
pub mod test_util;
