//! Main of the multi-call `t2fs` tool.
//!
//! The applet is selected by the binary name, so the program may be installed
//! as `mkimage.t2fs`, `mkfs.t2fs` or `t2sh` symbolic links. When invoked as
//! plain `t2fs`, the first argument names the applet instead.

mod mkfs;
mod mkimage;
mod prompt;
mod shell;

use std::path::PathBuf;
use std::process::exit;
use std::{env, fmt};

/// Writes an error to stderr, then exits.
pub fn error<M: fmt::Display>(bin: &str, msg: M) -> ! {
    eprintln!("{bin}: error: {msg}");
    exit(1);
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!(" t2fs <applet> [options...]");
    eprintln!();
    eprintln!("Applets:");
    eprintln!(" mkimage\tCreates a blank partitioned disk image.");
    eprintln!(" mkfs\t\tFormats a partition of an image.");
    eprintln!(" t2sh\t\tOpens an interactive shell on an image.");
}

fn main() {
    env_logger::init();
    let mut args = env::args_os();
    let mut bin = args
        .next()
        .map(PathBuf::from)
        .and_then(|p| {
            p.file_name()
                .and_then(|name| name.to_str())
                .map(str::to_owned)
        })
        .unwrap_or_else(|| {
            error("t2fs", "missing binary name");
        });
    if bin == "t2fs" {
        let Some(applet) = args.next().and_then(|s| s.into_string().ok()) else {
            print_usage();
            exit(1);
        };
        bin = applet;
    }
    match bin.as_str() {
        "mkimage" | "mkimage.t2fs" => mkimage::main(args),
        "mkfs" | "mkfs.t2fs" => mkfs::main(args),
        "t2sh" => shell::main(args),
        _ => error("t2fs", format_args!("invalid applet name `{bin}`")),
    }
}
