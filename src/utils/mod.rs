pub mod helpers;

#[cfg(test)]
pub(crate) mod fixtures;
