use anyhow::Result;
use clap::{Parser, Subcommand};
use fwlink_core::DeviceInfo;
use fwlink_core::protocol::DEVICE_INFO_TAG;
use std::path::PathBuf;
use std::process::Command;

#[derive(Parser)]
#[command(name = "xtask")]
#[command(about = "Tasks for the project", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the project
    Build,
    /// Run the test suite
    Test,
    /// Run the CLI
    Run {
        /// Arguments passed to fwlink
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
    /// Write a tagged firmware image for trying out `fwlink simulate`
    SampleFirmware {
        #[arg(long, default_value = "firmware")]
        dir: PathBuf,
        #[arg(long, default_value_t = 0x1234)]
        device_id: u32,
        #[arg(long, default_value_t = 64)]
        packet_size: u32,
        /// Image body size in bytes, tag excluded
        #[arg(long, default_value_t = 4096)]
        size: usize,
    },
}

fn cargo(args: &[&str], what: &str) -> Result<()> {
    let status = Command::new("cargo").args(args).status()?;
    if !status.success() {
        anyhow::bail!("{} failed", what);
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Build => {
            println!("Building project...");
            cargo(&["build"], "Build")?;
        }
        Commands::Test => {
            println!("Running tests...");
            cargo(&["test", "--workspace"], "Test")?;
        }
        Commands::Run { args } => {
            println!("Running CLI...");
            let mut full = vec!["run", "-p", "fwlink-cli", "--"];
            full.extend(args.iter().map(String::as_str));
            cargo(&full, "Run")?;
        }
        Commands::SampleFirmware {
            dir,
            device_id,
            packet_size,
            size,
        } => {
            let info = DeviceInfo {
                boot_version: 1,
                device_id,
                major_version: 1,
                minor_version: 0,
                firmware_packet_size: packet_size,
                firmware_max_size: 1024 * 1024,
                build_time: *b"0000000000",
            };
            let half = size / 2;
            let mut image: Vec<u8> = (0..half).map(|i| (i % 251) as u8).collect();
            image.extend_from_slice(&DEVICE_INFO_TAG);
            image.extend_from_slice(&info.to_bytes());
            image.extend((half..size).map(|i| (i % 251) as u8));

            std::fs::create_dir_all(&dir)?;
            let path = dir.join(format!("sample_{:04x}.bin", device_id));
            std::fs::write(&path, &image)?;
            println!("Wrote {} ({} bytes)", path.display(), image.len());
        }
    }

    Ok(())
}
