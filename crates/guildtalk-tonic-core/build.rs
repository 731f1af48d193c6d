/// Generates the gRPC bindings for `proto/guildtalk.proto`.
///
/// Message types and the `ChatGateway` client/server traits are emitted into
/// `OUT_DIR`, along with an encoded file descriptor set
/// (`guildtalk_descriptor.bin`) that the server registers with the reflection
/// service.
///
/// ```rust,ignore
/// pub mod proto {
///     tonic::include_proto!("guildtalk");
/// }
/// ```
use std::env;
use std::path::PathBuf;

fn main() {
    let out_dir = PathBuf::from(env::var("OUT_DIR").expect("OUT_DIR is set by cargo"));
    let descriptor_path = out_dir.join("guildtalk_descriptor.bin");

    println!("cargo:rerun-if-changed=proto/guildtalk.proto");

    let mut config = tonic_prost_build::Config::new();
    config.file_descriptor_set_path(&descriptor_path);

    tonic_prost_build::configure()
        .compile_with_config(config, &["proto/guildtalk.proto"], &["proto"])
        .expect("failed to compile proto/guildtalk.proto");
}
