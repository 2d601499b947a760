//! `ocidist version` command.

pub async fn execute() -> Result<(), Box<dyn std::error::Error>> {
    println!("ocidist version {}", ocidist_core::VERSION);
    println!("ocidist-api version {}", ocidist_api::VERSION);
    Ok(())
}
