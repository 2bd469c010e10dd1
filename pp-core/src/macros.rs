// Build a string map for labels, annotations, or config data, using
// kmap!("key1" => "value1", "key2" => "value2") syntax
#[macro_export]
macro_rules! kmap {
    ($($key:expr => $val:expr),+ $(,)?) => {
        ::std::collections::BTreeMap::from([$(($key.to_string(), $val.to_string())),+])
    };
}

// Same as kmap!, but wrapped in Some(...) so it can be dropped straight into an ObjectMeta
#[macro_export]
macro_rules! klabel {
    ($($key:expr => $val:expr),+ $(,)?) => {
        Some($crate::kmap!($($key => $val),+))
    };
}

pub use {
    klabel,
    kmap,
};
