use registry_guard::{config::Settings, credential::hash_password, runtime::run_standalone};
use std::{io::BufRead, path::PathBuf};

const USAGE: &str = "\
Usage: registry-guard [OPTIONS]

Options:
  -c, --config <path>  Path to the users/registry YAML file
                       (overrides REGISTRY_GUARD_CONFIG)
      --hash-password  Read a password from stdin and print its bcrypt hash
  -h, --help           Print help
";

#[derive(Debug, Default, PartialEq, Eq)]
struct CliOptions {
    config_path: Option<PathBuf>,
    hash_password: bool,
    help: bool,
}

fn parse_cli_args<I>(args: I) -> Result<CliOptions, String>
where
    I: IntoIterator<Item = String>,
{
    let mut options = CliOptions::default();
    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-h" | "--help" => {
                options.help = true;
            }
            "--hash-password" => {
                options.hash_password = true;
            }
            "-c" | "--config" => {
                let value = args
                    .next()
                    .ok_or_else(|| "missing value for --config".to_string())?;
                options.config_path = Some(PathBuf::from(value));
            }
            _ if arg.starts_with("--config=") => {
                let value = arg.trim_start_matches("--config=");
                if value.is_empty() {
                    return Err("missing value for --config".to_string());
                }
                options.config_path = Some(PathBuf::from(value));
            }
            _ => return Err(format!("unknown argument: {arg}")),
        }
    }
    Ok(options)
}

fn read_password<R: BufRead>(mut input: R) -> Result<String, String> {
    let mut line = String::new();
    input
        .read_line(&mut line)
        .map_err(|err| format!("failed to read password: {err}"))?;
    let password = line.trim_end_matches(['\r', '\n']).to_string();
    if password.trim().is_empty() {
        return Err("password must not be blank".to_string());
    }
    Ok(password)
}

#[tokio::main]
async fn main() {
    let options = match parse_cli_args(std::env::args().skip(1)) {
        Ok(options) => options,
        Err(err) => {
            eprintln!("{err}\n\n{USAGE}");
            std::process::exit(2);
        }
    };

    if options.help {
        println!("{USAGE}");
        return;
    }

    if options.hash_password {
        let hashed = read_password(std::io::stdin().lock())
            .and_then(|password| hash_password(&password).map_err(|err| err.to_string()));
        match hashed {
            Ok(hash) => println!("{hash}"),
            Err(err) => {
                eprintln!("{err}");
                std::process::exit(1);
            }
        }
        return;
    }

    let mut settings = match Settings::from_env() {
        Ok(settings) => settings,
        Err(err) => {
            eprintln!("invalid runtime configuration: {err}");
            std::process::exit(2);
        }
    };
    if let Some(config_path) = options.config_path {
        settings.config_path = Some(config_path);
    }

    if let Err(err) = run_standalone(settings).await {
        eprintln!("server error: {err}");
        std::process::exit(1);
    }
}
