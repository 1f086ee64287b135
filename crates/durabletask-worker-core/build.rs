/// Generates the prost messages and the tonic client for
/// `proto/orchestrator_service.proto`.
///
/// Only the client is built; a worker never serves the sidecar API. The proto
/// declares no package, so prost writes the output to `_.rs` in `OUT_DIR`,
/// which `common/proto.rs` pulls in with `tonic::include_proto!("_")`.
///
/// Well-known wrappers (`google.protobuf.StringValue`) map to plain Rust
/// types and `google.protobuf.Timestamp` maps to `prost_types::Timestamp`.
fn main() -> Result<(), Box<dyn std::error::Error>> {
    const PROTO: &str = "proto/orchestrator_service.proto";
    println!("cargo:rerun-if-changed={PROTO}");

    tonic_prost_build::configure()
        .build_server(false)
        .build_client(true)
        .compile_protos(&[PROTO], &["proto"])?;

    Ok(())
}
