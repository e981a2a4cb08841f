#[cfg(feature = "provider-converse")]
pub mod converse;
