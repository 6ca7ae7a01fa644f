fn main() {
    let args = std::env::args();
    // Initialize logging as early as possible; fallback to stderr on failure.
    let _ = shdefs::logging::init_logging(shdefs::logging::LogFormat::from_env());

    let outcome = shdefs::run(args);
    // Anything still registered at this point was never handed off.
    shdefs::store::scratch::cleanup_all();

    if let Err(err) = outcome {
        eprintln!("shdefs error: {err:#}");
        std::process::exit(shdefs::exit_code_for(&err));
    }
}
