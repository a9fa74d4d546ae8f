use anyhow::bail;
use clap::Parser;
use core::time::Duration;

/// Runtime configuration for the `callgate-server` binary.
///
/// All values are parsed from CLI arguments or environment variables. The
/// defaults suit a small single-host deployment.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "callgate-server",
    version,
    about = "A gRPC echo service driven by completion-queue call admission"
)]
pub struct CliArgs {
    /// Address to listen on.
    ///
    /// Environment variable: `SERVER_ADDR`
    #[arg(long, env = "SERVER_ADDR", default_value_t = String::from("0.0.0.0:50051"))]
    pub server_addr: String,

    /// Number of worker tasks running handlers.
    ///
    /// Environment variable: `NUM_WORKERS`
    #[arg(long, env = "NUM_WORKERS", default_value_t = 4)]
    pub num_workers: usize,

    /// Capacity of each worker's queue. Calls that find every queue full are
    /// dropped and reported to the client as an internal error.
    ///
    /// Environment variable: `WORK_QUEUE_SIZE`
    #[arg(long, env = "WORK_QUEUE_SIZE", default_value_t = 1024)]
    pub work_queue_size: usize,

    /// Number of threads pumping the completion queue.
    ///
    /// Environment variable: `NUM_DRIVERS`
    #[arg(long, env = "NUM_DRIVERS", default_value_t = 2)]
    pub num_drivers: usize,

    /// Seconds to wait for each worker to acknowledge shutdown.
    ///
    /// Environment variable: `SHUTDOWN_TIMEOUT`
    #[arg(long, env = "SHUTDOWN_TIMEOUT", default_value_t = 3)]
    pub shutdown_timeout: u64,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub server_addr: String,
    pub num_workers: usize,
    pub work_queue_size: usize,
    pub num_drivers: usize,
    pub shutdown_timeout: Duration,
}

impl TryFrom<CliArgs> for ServerConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        if args.num_workers == 0 {
            bail!("NUM_WORKERS must be greater than 0");
        }
        if args.work_queue_size == 0 {
            bail!("WORK_QUEUE_SIZE must be greater than 0");
        }
        if args.num_drivers == 0 {
            bail!("NUM_DRIVERS must be greater than 0");
        }

        Ok(Self {
            server_addr: args.server_addr,
            num_workers: args.num_workers,
            work_queue_size: args.work_queue_size,
            num_drivers: args.num_drivers,
            shutdown_timeout: Duration::from_secs(args.shutdown_timeout),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<ServerConfig, anyhow::Error> {
        let args = CliArgs::try_parse_from(core::iter::once("callgate-server").chain(args.iter().copied()))?;
        ServerConfig::try_from(args)
    }

    #[test]
    fn flags_override_defaults() {
        let config = parse(&[
            "--server-addr",
            "127.0.0.1:6000",
            "--num-workers",
            "8",
            "--num-drivers",
            "3",
            "--shutdown-timeout",
            "10",
        ])
        .unwrap();
        assert_eq!(config.server_addr, "127.0.0.1:6000");
        assert_eq!(config.num_workers, 8);
        assert_eq!(config.num_drivers, 3);
        assert_eq!(config.shutdown_timeout, Duration::from_secs(10));
    }

    #[test]
    fn zero_sizes_are_rejected() {
        for flag in ["--num-workers", "--work-queue-size", "--num-drivers"] {
            let err = parse(&[flag, "0"]).unwrap_err();
            assert!(err.to_string().contains("must be greater than 0"), "{flag}: {err}");
        }
    }
}
