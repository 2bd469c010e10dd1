pub use anyhow::{
    anyhow,
    bail,
    ensure,
};
pub use paste::paste;
pub use regex::{
    Regex,
    RegexBuilder,
};
pub use thiserror::Error;

pub type EmptyResult = anyhow::Result<()>;

pub const BUILD_DIR: &str = "/.build/";
pub const RUSTC_DIR: &str = "/rustc/";
pub const GLIBC: &str = "glibc";

// This macro creates an enum which derives from thiserror::Error, and also
// creates constructor functions in snake case for each of the enum variants
#[macro_export]
macro_rules! err_impl {
    (@hidden $errtype:ident, $item:ident, String) => {
        paste! {
            pub fn [<$item:snake>](in_: &str) -> anyhow::Error {
                anyhow!{$errtype::$item(in_.into())}
            }
        }
    };

    (@hidden $errtype:ident, $item:ident, $($dtype:tt)::+) => {
        paste! {
            pub fn [<$item:snake>](in_: &$($dtype)::+) -> anyhow::Error {
                anyhow!{$errtype::$item(in_.clone())}
            }
        }
    };

    ($errtype:ident,
        $(#[$errinfo:meta] $item:ident($($dtype:tt)::+),)+
    ) => {
        #[derive(Debug, Error)]
        pub enum $errtype {
            $(#[$errinfo] $item($($dtype)::+)),+
        }

        impl $errtype {
            $(err_impl! {@hidden $errtype, $item, $($dtype)::+})+
        }
    };
}

// Folds a batch of independent results into one; every failure message is kept
pub fn join_errors(results: impl IntoIterator<Item = EmptyResult>) -> EmptyResult {
    let msgs: Vec<String> = results.into_iter().filter_map(|r| r.err()).map(|e| format!("{e:#}")).collect();
    if msgs.is_empty() {
        return Ok(());
    }
    bail!(msgs.join("; "))
}

const FRAME_PATTERN: &str = r"^\s+\d+(?s:.*?)(\s+at\s+.*:\d+)$";

fn skipped_marker(n: usize) -> String {
    match n {
        0 => String::new(),
        1 => "      -- <skipped 1 frame> --\n".into(),
        _ => format!("      -- <skipped {n} frames> --\n"),
    }
}

// Cuts a backtrace down to the frames that come from our code; runs of std/tokio/glibc frames are
// collapsed into a single "skipped" line.  Adapted from
// https://github.com/rust-lang/rust/issues/79676#issuecomment-1502670961.
pub fn filtered_backtrace(bt: &str) -> String {
    let Ok(re) = RegexBuilder::new(FRAME_PATTERN).multi_line(true).build() else {
        return bt.into();
    };

    let mut skipped = 0;
    let mut filtered = re.find_iter(bt).fold(String::new(), |mut acc, frame| {
        let frame = frame.as_str();
        if frame.contains(BUILD_DIR) || frame.contains(RUSTC_DIR) || frame.contains(GLIBC) {
            skipped += 1;
        } else if !frame.is_empty() {
            acc += &skipped_marker(skipped);
            acc += &format!("{frame}\n");
            skipped = 0;
        }
        acc
    });
    filtered += &skipped_marker(skipped);
    filtered
}

// Logs a fatal error along with the interesting part of its backtrace; capturing and filtering
// the backtrace is slow, so this is only for errors that end the run.
#[macro_export]
macro_rules! pperr {
    ($err:ident, $msg:literal $(, $args:expr)* $(,)?) => {
        let bt = $crate::errors::filtered_backtrace(&$err.backtrace().to_string());
        error!(concat!($msg, "\n\n{}\n\nPartial Stack Trace:\n\n{}\n") $(, $args)*, $err, bt);
    };
}

pub use {
    err_impl,
    pperr,
};
