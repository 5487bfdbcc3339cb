fn main() -> Result<(), Box<dyn std::error::Error>> {
    tonic_build::configure()
        .compile_protos(&["proto/broadcast.proto"], &["."])
        .unwrap_or_else(|e| panic!("protobuf compile error: {}", e));

    Ok(())
}
