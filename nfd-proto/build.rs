fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("cargo:rerun-if-changed=proto/labeler.proto");
    tonic_build::compile_protos("proto/labeler.proto")?;
    Ok(())
}
