use task_executor::{app::args, logging, run};

fn main() {
    if let Err(err) = run_main() {
        eprintln!("task_executor error: {err:?}");
        std::process::exit(1);
    }
}

fn run_main() -> anyhow::Result<()> {
    let args = args::parse();
    logging::init_logging(args.log_level)?;
    run(&args)?;
    Ok(())
}
