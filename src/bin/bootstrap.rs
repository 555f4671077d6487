use wave_cap_sim::utils::logger;
use wave_cap_sim::{Bootstrap, SimError, SystemRunner};

fn main() {
    logger::init_cli_logger(false);

    let root = match std::env::current_dir() {
        Ok(root) => root,
        Err(e) => {
            eprintln!("Cannot resolve working directory: {}", e);
            std::process::exit(1);
        }
    };

    match Bootstrap::new(&root, SystemRunner).run() {
        Ok(report) => {
            println!(
                "Setup complete in {} ({} directories created)",
                root.display(),
                report.scaffold.created_dirs.len()
            );
        }
        Err(e) => {
            eprintln!("{}", e.user_friendly_message());
            if let SimError::ProvisionStepFailed { stderr, .. } = &e {
                if !stderr.is_empty() {
                    eprintln!("{}", stderr);
                }
            }
            std::process::exit(e.exit_code());
        }
    }
}
