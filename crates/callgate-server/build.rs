/// Generates the gRPC server and client bindings for `proto/echo.proto`.
///
/// The encoded file descriptor set is written next to the generated code so
/// the binary can serve it through gRPC reflection:
///
/// ```rust,ignore
/// pub mod proto {
///     tonic::include_proto!("callgate.echo");
///     pub const FILE_DESCRIPTOR_SET: &[u8] =
///         tonic::include_file_descriptor_set!("echo_descriptor");
/// }
/// ```
use std::env;
use std::path::PathBuf;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let out_dir = PathBuf::from(env::var("OUT_DIR")?);
    let descriptor_path = out_dir.join("echo_descriptor.bin");

    println!("cargo:rerun-if-changed=proto/echo.proto");

    tonic_prost_build::configure()
        .file_descriptor_set_path(&descriptor_path)
        .compile_protos(&["proto/echo.proto"], &["proto"])?;
    Ok(())
}
