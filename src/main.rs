//! bucket-fs command-line entry point

use std::path::PathBuf;
use std::time::UNIX_EPOCH;

use futures::StreamExt;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use bucket_fs::adapter::bucket::BucketAdapter;
use bucket_fs::config::Config;
use bucket_fs::filesystem::Filesystem;
use bucket_fs::node::Node;

/// Print usage information
fn print_usage() {
    eprintln!("Usage: bucket-fs <config.yaml> <command> [args]");
    eprintln!();
    eprintln!("bucket-fs - an S3 bucket behind an async filesystem adapter");
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  ls [prefix]             List a directory (\"\" is the bucket root)");
    eprintln!("  stat <path>             Show size and modification time");
    eprintln!("  cat <key>               Write an object to stdout");
    eprintln!("  put <local-file> <key>  Upload a local file");
    eprintln!("  touch <key>             Create an empty object");
    eprintln!("  rm <key>                Delete an object");
    eprintln!("  mv <from> <to>          Rename an object (copy, then delete)");
    eprintln!();
    eprintln!("Example:");
    eprintln!("  bucket-fs /etc/bucket-fs/config.yaml ls photos/");
}

/// Parsed command line
enum Command {
    Ls(String),
    Stat(String),
    Cat(String),
    Put(PathBuf, String),
    Touch(String),
    Rm(String),
    Mv(String, String),
}

fn parse_command(args: &[String]) -> Option<Command> {
    let command = match args {
        [cmd] if cmd == "ls" => Command::Ls(String::new()),
        [cmd, prefix] if cmd == "ls" => Command::Ls(prefix.clone()),
        [cmd, path] if cmd == "stat" => Command::Stat(path.clone()),
        [cmd, key] if cmd == "cat" => Command::Cat(key.clone()),
        [cmd, local, key] if cmd == "put" => Command::Put(PathBuf::from(local), key.clone()),
        [cmd, key] if cmd == "touch" => Command::Touch(key.clone()),
        [cmd, key] if cmd == "rm" => Command::Rm(key.clone()),
        [cmd, from, to] if cmd == "mv" => Command::Mv(from.clone(), to.clone()),
        _ => return None,
    };
    Some(command)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse arguments
    let args: Vec<String> = std::env::args().collect();
    if args.len() < 3 {
        print_usage();
        std::process::exit(1);
    }

    let config_path = PathBuf::from(&args[1]);
    let command = match parse_command(&args[2..]) {
        Some(command) => command,
        None => {
            print_usage();
            std::process::exit(1);
        }
    };

    // Load configuration
    let config = match Config::from_file(&config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config: {}", e);
            std::process::exit(1);
        }
    };

    // Validate configuration
    if let Err(e) = config.validate() {
        eprintln!("Configuration error: {}", e);
        std::process::exit(1);
    }

    // Initialize logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    debug!("Loaded configuration from {:?}", config_path);

    let adapter = BucketAdapter::from_config(&config).await?;
    let fs = Filesystem::from_adapter(adapter.clone());

    let result = run(&fs, command).await;
    adapter.shutdown();
    result
}

async fn run(fs: &Filesystem, command: Command) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Command::Ls(prefix) => {
            let mut nodes = fs.dir(&prefix).ls_streaming();
            let mut count = 0usize;
            while let Some(node) = nodes.next().await {
                match node? {
                    Node::File(file) => println!("{}", file.path()),
                    Node::Directory(dir) => println!("{}", dir.path()),
                }
                count += 1;
            }
            info!("Found {} nodes", count);
        }
        Command::Stat(path) => {
            let stat = fs.adapter().stat(&path).await?;
            if stat.is_empty() {
                println!("{}: directory", path);
            } else {
                let mtime = stat
                    .mtime
                    .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                    .map(|d| d.as_secs())
                    .unwrap_or_default();
                println!(
                    "{}: {} bytes, modified {}",
                    path,
                    stat.size.unwrap_or_default(),
                    mtime
                );
            }
        }
        Command::Cat(key) => {
            let mut reader = fs.file(&key)?.open("r").await?.into_reader()?;
            let mut stdout = tokio::io::stdout();
            tokio::io::copy(&mut reader, &mut stdout).await?;
        }
        Command::Put(local, key) => {
            let mut source = tokio::fs::File::open(&local).await?;
            let mut sink = fs.file(&key)?.open("w").await?.into_sink()?;
            let copied = tokio::io::copy(&mut source, &mut sink).await?;
            sink.finish().await?;
            info!("Uploaded {:?} to {} ({} bytes)", local, key, copied);
        }
        Command::Touch(key) => {
            fs.file(&key)?.touch().await?;
        }
        Command::Rm(key) => {
            fs.file(&key)?.remove().await?;
        }
        Command::Mv(from, to) => {
            let moved = fs.file(&from)?.rename(&to).await?;
            info!("Renamed {} to {}", from, moved.path());
        }
    }

    Ok(())
}
