fn main() {
    if let Err(err) = testcase_import::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
