fn main() {
    if let Err(e) = reticle_lib::run() {
        eprintln!("reticle: {e}");
        std::process::exit(1);
    }
}
