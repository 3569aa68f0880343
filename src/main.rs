fn main() {
    if let Err(err) = sfc_arrange::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
