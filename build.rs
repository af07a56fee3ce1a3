use std::path::PathBuf;

const DEFAULT_MODEL_PATH: &str = "model/model_int8.lgqm";

fn main() {
    println!("cargo:rerun-if-env-changed=LIDGUARD_MODEL");
    println!("cargo:rerun-if-changed={DEFAULT_MODEL_PATH}");

    // Embed the quantized classifier. A missing model is a valid build:
    // the firmware then runs the classifier in its degraded UNKNOWN mode.
    let source = std::env::var("LIDGUARD_MODEL").unwrap_or_else(|_| DEFAULT_MODEL_PATH.into());
    let out_dir = PathBuf::from(std::env::var("OUT_DIR").expect("OUT_DIR set by cargo"));
    let dest = out_dir.join("model_blob.bin");

    match std::fs::read(&source) {
        Ok(bytes) => {
            std::fs::write(&dest, &bytes).expect("write embedded model");
            println!("cargo:warning=embedded model {source} ({} bytes)", bytes.len());
        }
        Err(_) => {
            std::fs::write(&dest, []).expect("write empty model placeholder");
        }
    }

    #[cfg(feature = "espidf")]
    embuild::espidf::sysenv::output();
}
