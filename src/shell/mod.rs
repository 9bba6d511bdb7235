//! `t2sh` is an interactive shell driving a T2FS disk image.
//!
//! One command per line, in the spirit of the usual shell utilities. File
//! commands take paths inside the image; `read` shows a hex dump; `cp` and
//! `fscp` move data between the host and the image.

use crate::error;
use crate::prompt::prompt;
use std::env::ArgsOs;
use std::fs;
use std::path::PathBuf;
use std::process::exit;
use t2fs::{Disk, Error, FileType, Result, T2fs};

/// Structure storing command line arguments.
#[derive(Default)]
struct Args {
    /// If true, print command line help.
    help: bool,
    /// The partition to mount.
    partition: Option<usize>,
    /// The path to the image to work on.
    image: Option<PathBuf>,
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
                    error("t2sh", "`--partition` expects a number");
                }
            }
            _ => res.image = Some(PathBuf::from(arg)),
        }
    }
    res
}

fn print_help() {
    println!();
    println!("Usage:");
    println!(" t2sh [options] <image>");
    println!();
    println!("Opens an interactive shell on a T2FS disk image.");
    println!();
    println!("Options:");
    println!(" -h, --help\t\tPrints help.");
    println!(" -p, --partition <n>\tPartition to mount (default 0).");
}

fn print_cmd_help() {
    println!();
    println!("Help:");
    println!();
    println!("  Filesystem");
    println!("   format <spb>      format the partition, <spb> sectors per block");
    println!("   info              print the superblock");
    println!("   df                print inode and block usage");
    println!("   about             print the library identification");
    println!();
    println!("  Directories");
    println!("   ls [path]         list a directory");
    println!("   cd <path>         change the current directory");
    println!("   pwd               print the current directory");
    println!("   mkdir <path>      create a directory");
    println!("   rmdir <path>      remove an empty directory");
    println!();
    println!("  Files");
    println!("   create <path>     create a file and open it");
    println!("   open <path>       open a file, printing its handle");
    println!("   close <fd>        close a handle");
    println!("   read <fd> <n>     read and hex-dump <n> bytes");
    println!("   write <fd> <text> write text at the current position");
    println!("   seek <fd> <off>   move the position (-1 for the end)");
    println!("   trunc <fd>        cut the file at the current position");
    println!("   rm <path>         remove a file or symbolic link");
    println!("   stat <path>       print file information");
    println!();
    println!("  Links");
    println!("   ln <target> <link>   create a symbolic link");
    println!("   hln <target> <link>  create a hard link");
    println!();
    println!("  Host");
    println!("   cp <host> <path>  copy a host file into the image");
    println!("   fscp <path> <host> copy a file out to the host");
    println!();
    println!("  Misc");
    println!("   help              print this menu");
    println!("   exit              quit");
    println!();
}

/// Prints `data` as a hex dump, sixteen bytes per line.
fn hex_dump(data: &[u8], base: u32) {
    for (i, line) in data.chunks(16).enumerate() {
        print!("{:08x} ", base as usize + i * 16);
        for j in 0..16 {
            match line.get(j) {
                Some(b) => print!(" {b:02x}"),
                None => print!("   "),
            }
        }
        print!("  |");
        for b in line {
            let c = if b.is_ascii_graphic() || *b == b' ' {
                *b as char
            } else {
                '.'
            };
            print!("{c}");
        }
        println!("|");
    }
}

/// Returns the character used to tag a file type in listings.
fn type_char(kind: FileType) -> char {
    match kind {
        FileType::Regular => '-',
        FileType::Directory => 'd',
        FileType::Symlink => 'l',
    }
}

/// The shell state: the mounted filesystem, if any, and what is needed to
/// reopen the image after a format.
struct Shell {
    image: PathBuf,
    partition: usize,
    fs: Option<T2fs>,
}

impl Shell {
    /// Returns the mounted filesystem, if the partition is formatted.
    fn fs(&mut self) -> Result<&mut T2fs> {
        self.fs.as_mut().ok_or(Error::BadSuperblock)
    }

    fn format(&mut self, sectors_per_block: u8) -> Result<()> {
        let disk = match self.fs.take() {
            Some(fs) => fs.into_disk(),
            None => Disk::open(&self.image)?,
        };
        match T2fs::format(disk, self.partition, sectors_per_block) {
            Ok(fs) => {
                self.fs = Some(fs);
                println!("partition {} formatted", self.partition);
                Ok(())
            }
            Err(e) => {
                // The disk was consumed; get the previous state back.
                self.fs = Disk::open(&self.image)
                    .and_then(|disk| T2fs::mount(disk, self.partition))
                    .ok();
                Err(e)
            }
        }
    }

    fn ls(&mut self, path: &str) -> Result<()> {
        let fs = self.fs()?;
        let fd = fs.opendir(path)?;
        while let Some(entry) = fs.readdir(fd)? {
            println!("{} {:>10}  {}", type_char(entry.kind), entry.size, entry.name);
        }
        fs.closedir(fd)
    }

    fn run_cmd(&mut self, argv: &[String]) -> Result<()> {
        /// Extracts and parses positional arguments, printing a usage line
        /// when they are missing or malformed.
        macro_rules! args {
            ($usage:literal, $($i:literal $t:ty),+) => {
                ($(match argv.get($i).and_then(|s| s.parse::<$t>().ok()) {
                    Some(v) => v,
                    None => {
                        eprintln!("usage: {}", $usage);
                        return Ok(());
                    }
                }),+)
            };
        }
        match argv[0].as_str() {
            "format" => {
                let spb = args!("format <sectors per block>", 1 u8);
                self.format(spb)
            }
            "info" => {
                let sb = self.fs()?.geometry();
                let (spb, num_sectors) = (sb.sectors_per_block, sb.num_sectors);
                let (block_size, num_blocks, num_inodes) =
                    (sb.block_size, sb.num_blocks, sb.num_inodes);
                let (first, it, ib, bb, blocks) = (
                    sb.first_sector,
                    sb.it_offset,
                    sb.ib_offset,
                    sb.bb_offset,
                    sb.blocks_offset,
                );
                println!("sectors per block : {spb}");
                println!("sector count      : {num_sectors} (first sector {first})");
                println!("block size        : {block_size} byte(s)");
                println!("data blocks       : {num_blocks}");
                println!("inodes            : {num_inodes}");
                println!("layout offsets    : inode table {it}, inode bitmap {ib}, block bitmap {bb}, data {blocks}");
                Ok(())
            }
            "df" => {
                let usage = self.fs()?.statfs()?;
                println!(
                    "inodes: {}/{}  blocks: {}/{}",
                    usage.inodes_used, usage.num_inodes, usage.blocks_used, usage.num_blocks
                );
                Ok(())
            }
            "about" => {
                println!("{}", t2fs::identify());
                Ok(())
            }
            "ls" => {
                let path = argv.get(1).map(String::as_str).unwrap_or(".");
                self.ls(path)
            }
            "cd" => {
                let path = args!("cd <path>", 1 String);
                self.fs()?.chdir(&path)
            }
            "pwd" => {
                let cwd = self.fs()?.getcwd()?;
                println!("{cwd}");
                Ok(())
            }
            "mkdir" => {
                let path = args!("mkdir <path>", 1 String);
                self.fs()?.mkdir(&path)
            }
            "rmdir" => {
                let path = args!("rmdir <path>", 1 String);
                self.fs()?.rmdir(&path)
            }
            "create" => {
                let path = args!("create <path>", 1 String);
                let fd = self.fs()?.create(&path)?;
                println!("handle {fd}");
                Ok(())
            }
            "open" => {
                let path = args!("open <path>", 1 String);
                let fd = self.fs()?.open(&path)?;
                println!("handle {fd}");
                Ok(())
            }
            "close" => {
                let fd = args!("close <fd>", 1 i32);
                self.fs()?.close(fd)
            }
            "read" => {
                let (fd, size) = args!("read <fd> <size>", 1 i32, 2 usize);
                let fs = self.fs()?;
                let mut buf = vec![0u8; size];
                let n = fs.read(fd, &mut buf)?;
                hex_dump(&buf[..n], 0);
                println!("{n} byte(s) read");
                Ok(())
            }
            "write" => {
                if argv.len() < 3 {
                    eprintln!("usage: write <fd> <text>");
                    return Ok(());
                }
                let fd = args!("write <fd> <text>", 1 i32);
                let text = argv[2..].join(" ");
                let n = self.fs()?.write(fd, text.as_bytes())?;
                println!("{n} byte(s) written");
                Ok(())
            }
            "seek" => {
                let (fd, off) = args!("seek <fd> <offset>", 1 i32, 2 i64);
                self.fs()?.seek(fd, off)
            }
            "trunc" => {
                let fd = args!("trunc <fd>", 1 i32);
                self.fs()?.truncate(fd)
            }
            "rm" => {
                let path = args!("rm <path>", 1 String);
                self.fs()?.unlink(&path)
            }
            "stat" => {
                let path = args!("stat <path>", 1 String);
                let meta = self.fs()?.stat(&path)?;
                println!(
                    "{} {} byte(s), {} block(s), {} link(s)",
                    type_char(meta.kind),
                    meta.size,
                    meta.blocks,
                    meta.links
                );
                Ok(())
            }
            "ln" => {
                let (target, link) = args!("ln <target> <link>", 1 String, 2 String);
                self.fs()?.symlink(&target, &link)
            }
            "hln" => {
                let (target, link) = args!("hln <target> <link>", 1 String, 2 String);
                self.fs()?.link(&target, &link)
            }
            "cp" => {
                let (host, path) = args!("cp <host file> <path>", 1 String, 2 String);
                let data = fs::read(&host)?;
                let fs = self.fs()?;
                let fd = fs.create(&path)?;
                let n = fs.write(fd, &data)?;
                fs.close(fd)?;
                println!("{n} byte(s) copied");
                Ok(())
            }
            "fscp" => {
                let (path, host) = args!("fscp <path> <host file>", 1 String, 2 String);
                let fs = self.fs()?;
                let fd = fs.open(&path)?;
                let mut data = Vec::new();
                let mut buf = [0u8; 4096];
                loop {
                    let n = fs.read(fd, &mut buf)?;
                    if n == 0 {
                        break;
                    }
                    data.extend_from_slice(&buf[..n]);
                }
                fs.close(fd)?;
                fs::write(&host, &data)?;
                println!("{} byte(s) copied", data.len());
                Ok(())
            }
            "help" | "man" | "m" => {
                print_cmd_help();
                Ok(())
            }
            "exit" | "quit" | "q" => exit(0),
            cmd => {
                eprintln!("{cmd}: unknown command");
                Ok(())
            }
        }
    }
}

pub fn main(args: ArgsOs) {
    let args = parse_args(args);
    if args.help {
        print_help();
        exit(0);
    }
    let image = args.image.unwrap_or_else(|| {
        error("t2sh", "specify path to an image");
    });
    let partition = args.partition.unwrap_or(0);
    let disk = Disk::open(&image).unwrap_or_else(|e| {
        error("t2sh", format_args!("{}: {e}", image.display()));
    });
    let fs = match T2fs::mount(disk, partition) {
        Ok(fs) => Some(fs),
        Err(Error::BadSuperblock) => {
            eprintln!("partition {partition} is not formatted; run `format <sectors per block>`");
            None
        }
        Err(e) => error("t2sh", format_args!("{}: {e}", image.display())),
    };
    let mut shell = Shell {
        image,
        partition,
        fs,
    };
    while let Some(line) = prompt("t2fs> ") {
        let argv: Vec<String> = line.split_whitespace().map(str::to_owned).collect();
        if argv.is_empty() {
            continue;
        }
        if let Err(e) = shell.run_cmd(&argv) {
            eprintln!("{}: {e}", argv[0]);
        }
    }
}
