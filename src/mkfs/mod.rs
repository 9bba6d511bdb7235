//! The `mkfs` applet formats a partition of a disk image with T2FS.

use crate::error;
use crate::prompt::prompt;
use std::env::ArgsOs;
use std::path::PathBuf;
use std::process::exit;
use t2fs::{Disk, T2fs};

/// Structure storing command line arguments.
#[derive(Default)]
struct Args {
    /// If true, print command line help.
    help: bool,
    /// The partition to format.
    partition: Option<usize>,
    /// The number of sectors per logical block.
    sectors_per_block: Option<u8>,
    /// The path to the image on which the filesystem will be created.
    device_path: Option<PathBuf>,
}

fn parse_args(args: ArgsOs) -> Args {
    let mut res: Args = Default::default();
    let mut iter = args;
    while let Some(arg) = iter.next() {
        match arg.to_str() {
            Some("-h" | "--help") => res.help = true,
            Some("-p" | "--partition") => {
                res.partition = iter
                    .next()
                    .and_then(|s| s.to_str().and_then(|s| s.parse().ok()));
                if res.partition.is_none() {
                    error("mkfs", "`--partition` expects a number");
                }
            }
            Some("-b" | "--block") => {
                res.sectors_per_block = iter
                    .next()
                    .and_then(|s| s.to_str().and_then(|s| s.parse().ok()));
                if res.sectors_per_block.is_none() {
                    error("mkfs", "`--block` expects a number of sectors");
                }
            }
            _ => res.device_path = Some(PathBuf::from(arg)),
        }
    }
    res
}

fn print_help() {
    println!();
    println!("Usage:");
    println!(" mkfs [options] <image>");
    println!();
    println!("Formats a partition of a disk image.");
    println!();
    println!("Options:");
    println!(" -h, --help\t\tPrints help.");
    println!(" -p, --partition <n>\tPartition to format (default 0).");
    println!(" -b, --block <n>\tSectors per logical block, 1 to 128 (default 1).");
}

pub fn main(args: ArgsOs) {
    let args = parse_args(args);
    if args.help {
        print_help();
        exit(0);
    }
    let device_path = args.device_path.unwrap_or_else(|| {
        error("mkfs", "specify path to a device");
    });
    let partition = args.partition.unwrap_or(0);
    let sectors_per_block = args.sectors_per_block.unwrap_or(1);

    let mut disk = Disk::open(&device_path).unwrap_or_else(|e| {
        error("mkfs", format_args!("{}: {e}", device_path.display()));
    });
    let formatted = T2fs::probe(&mut disk, partition).unwrap_or_else(|e| {
        error("mkfs", format_args!("{}: {e}", device_path.display()));
    });
    if formatted {
        println!(
            "partition {partition} of {} already contains a file system",
            device_path.display()
        );
        let confirm = prompt("Proceed anyway? (y/N) ")
            .map(|s| s.to_lowercase() == "y")
            .unwrap_or(false);
        if !confirm {
            eprintln!("Abort.");
            exit(1);
        }
    }
    let fs = T2fs::format(disk, partition, sectors_per_block).unwrap_or_else(|e| {
        error("mkfs", format_args!("failed to create filesystem: {e}"));
    });
    let sb = fs.geometry();
    let (num_blocks, block_size, num_inodes) = (sb.num_blocks, sb.block_size, sb.num_inodes);
    println!(
        "partition {partition}: {num_blocks} block(s) of {block_size} byte(s), {num_inodes} inode(s)"
    );
}
