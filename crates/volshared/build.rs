//! Compiles the share manager and health protocol definitions.
//!
//! Generated code is placed in `OUT_DIR` and included with
//! `tonic::include_proto!` in `src/grpc.rs`.

#![allow(unsafe_code)]

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let protoc = protoc_bin_vendored::protoc_bin_path()?;
    // SAFETY: the build script is single-threaded.
    unsafe { std::env::set_var("PROTOC", protoc) };

    let protos = [
        "../../proto/volshare.proto",
        "../../proto/grpc/health/v1/health.proto",
    ];

    tonic_prost_build::configure()
        .build_server(true)
        .build_client(false)
        .compile_protos(&protos, &["../../proto"])?;

    for proto in protos {
        println!("cargo:rerun-if-changed={proto}");
    }

    Ok(())
}
