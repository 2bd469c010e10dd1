mod assert;
mod props;
mod vpc;

pub use assert::*;
pub use props::*;
pub use vpc::*;

#[cfg(test)]
mod tests;
