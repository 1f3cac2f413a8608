use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use std::time::Duration;

use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use log::{error, info, warn, LevelFilter};
use log4rs::append::console::ConsoleAppender;
use log4rs::config::{Appender, Config, Root};
use num_bigint::BigUint;
use rand::thread_rng;

use evote::persist::{load_credential, load_eligible_ids, load_keys, save_credential, save_keys};
use evote::registration::{register, RegistrationAuthority, RegistrationResult};
use evote::rsa::KeyMaterial;
use evote::server::{accept_loop, connect};
use evote::voting::{cast_vote, BallotResult, Vote, VoteCollector};
use evote::Result;

const LOG_CONFIG: &str = "log4rs.yaml";

const REGISTRATION_ENDPOINT: &str = "127.0.0.1:2021";
const VOTING_ENDPOINT: &str = "127.0.0.1:2022";

/// Exit code for a session that completed but was refused.
const REFUSED: i32 = 2;

fn parse_identity(value: &str) -> std::result::Result<BigUint, String> {
    value
        .parse()
        .map_err(|_| format!("{:?} is not a decimal identity", value))
}

fn keys_arg() -> Arg {
    Arg::new("keys")
        .long("keys")
        .help("Authority key file (d, n, p, q)")
        .value_parser(value_parser!(PathBuf))
        .default_value("authority-keys.txt")
}

fn security_constant_arg() -> Arg {
    Arg::new("security-constant")
        .long("security-constant")
        .short('k')
        .help("Secret tuples per voter")
        .value_parser(value_parser!(usize))
        .default_value("10")
}

fn prime_bits_arg() -> Arg {
    Arg::new("prime-bits")
        .long("prime-bits")
        .help("Bit length of each RSA prime")
        .value_parser(value_parser!(u64))
        .default_value("512")
}

fn timeout_arg() -> Arg {
    Arg::new("timeout")
        .long("timeout")
        .help("Seconds a session may wait on its peer (0 disables)")
        .value_parser(value_parser!(u64))
        .default_value("30")
}

fn endpoint_arg(name: &'static str, default: &'static str) -> Arg {
    Arg::new(name)
        .long(name)
        .help("host:port")
        .action(ArgAction::Set)
        .default_value(default)
}

fn identity_arg() -> Arg {
    Arg::new("id")
        .long("id")
        .help("Voter identity (decimal)")
        .value_parser(parse_identity)
        .required(true)
}

/// Construct the CLI configuration.
fn cli() -> Command {
    // Make the build dirty when the toml changes.
    include_str!("../Cargo.toml");

    clap::command!("evote")
        .about("Anonymous voting with cut-and-choose blind signatures")
        .subcommand_required(true)
        .subcommand(
            Command::new("keygen")
                .about("Generate and store authority key material")
                .arg(keys_arg())
                .arg(prime_bits_arg()),
        )
        .subcommand(
            Command::new("authority")
                .about("Run the registration authority")
                .arg(endpoint_arg("listen", REGISTRATION_ENDPOINT))
                .arg(keys_arg())
                .arg(
                    Arg::new("ids")
                        .long("ids")
                        .help("Eligible identity list")
                        .value_parser(value_parser!(PathBuf))
                        .default_value("ids.txt"),
                )
                .arg(security_constant_arg())
                .arg(prime_bits_arg())
                .arg(timeout_arg()),
        )
        .subcommand(
            Command::new("register")
                .about("Obtain a pseudonym from the registration authority")
                .arg(endpoint_arg("connect", REGISTRATION_ENDPOINT))
                .arg(identity_arg())
                .arg(
                    Arg::new("out")
                        .long("out")
                        .help("Credential file to write [default: credential-<id>.txt]")
                        .value_parser(value_parser!(PathBuf)),
                )
                .arg(timeout_arg()),
        )
        .subcommand(
            Command::new("collector")
                .about("Run the vote collector")
                .arg(endpoint_arg("listen", VOTING_ENDPOINT))
                .arg(keys_arg())
                .arg(security_constant_arg())
                .arg(timeout_arg()),
        )
        .subcommand(
            Command::new("vote")
                .about("Cast a ballot under a registered pseudonym")
                .arg(endpoint_arg("connect", VOTING_ENDPOINT))
                .arg(identity_arg())
                .arg(
                    Arg::new("credential")
                        .long("credential")
                        .help("Credential file [default: credential-<id>.txt]")
                        .value_parser(value_parser!(PathBuf)),
                )
                .arg(
                    Arg::new("vote")
                        .long("vote")
                        .value_parser(["yes", "no"])
                        .required(true),
                )
                .arg(timeout_arg()),
        )
}

fn init_logging() {
    if let Err(e) = log4rs::init_file(LOG_CONFIG, Default::default()) {
        let stdout = ConsoleAppender::builder().build();
        let config = Config::builder()
            .appender(Appender::builder().build("stdout", Box::new(stdout)))
            .build(Root::builder().appender("stdout").build(LevelFilter::Info));
        if let Ok(config) = config {
            let _ = log4rs::init_config(config);
        }
        warn!("{} not loaded ({}), logging to stdout", LOG_CONFIG, e);
    }
}

fn timeout(args: &ArgMatches) -> Option<Duration> {
    match args.get_one::<u64>("timeout") {
        Some(0) | None => None,
        Some(secs) => Some(Duration::from_secs(*secs)),
    }
}

fn credential_path(args: &ArgMatches, name: &str, id: &BigUint) -> PathBuf {
    args.get_one::<PathBuf>(name)
        .cloned()
        .unwrap_or_else(|| PathBuf::from(format!("credential-{}.txt", id)))
}

fn string_arg<'a>(args: &'a ArgMatches, name: &str) -> &'a str {
    args.get_one::<String>(name).map(String::as_str).unwrap_or_default()
}

fn load_or_generate_keys(path: &Path, bits: u64) -> Result<KeyMaterial> {
    if path.exists() {
        info!("loading key material from {}", path.display());
        return load_keys(path);
    }
    info!("generating {}-bit primes", bits);
    let keys = KeyMaterial::generate(bits, &mut thread_rng())?;
    save_keys(path, &keys)?;
    info!("key material stored in {}", path.display());
    Ok(keys)
}

fn run(args: &ArgMatches) -> Result<i32> {
    match args.subcommand() {
        Some(("keygen", args)) => {
            let path = args.get_one::<PathBuf>("keys").expect("has default");
            let bits = *args.get_one::<u64>("prime-bits").expect("has default");
            let keys = KeyMaterial::generate(bits, &mut thread_rng())?;
            save_keys(path, &keys)?;
            info!("wrote {}-bit modulus to {}", keys.n.bits(), path.display());
            Ok(0)
        }
        Some(("authority", args)) => {
            let keys = load_or_generate_keys(
                args.get_one::<PathBuf>("keys").expect("has default"),
                *args.get_one::<u64>("prime-bits").expect("has default"),
            )?;
            let eligible = load_eligible_ids(args.get_one::<PathBuf>("ids").expect("has default"))?;
            info!("{} eligible identities", eligible.len());
            let k = *args.get_one::<usize>("security-constant").expect("has default");
            let authority = Arc::new(RegistrationAuthority::new(keys, eligible, k)?);

            let listener = TcpListener::bind(string_arg(args, "listen"))?;
            accept_loop(listener, authority, timeout(args))?;
            Ok(0)
        }
        Some(("collector", args)) => {
            let keys = load_keys(args.get_one::<PathBuf>("keys").expect("has default"))?;
            let k = *args.get_one::<usize>("security-constant").expect("has default");
            let collector = Arc::new(VoteCollector::new(keys, k)?);

            let listener = TcpListener::bind(string_arg(args, "listen"))?;
            accept_loop(listener, collector, timeout(args))?;
            Ok(0)
        }
        Some(("register", args)) => {
            let id = args.get_one::<BigUint>("id").expect("required");
            let stream = connect(string_arg(args, "connect"), timeout(args))?;
            match register(&stream, id, &mut thread_rng())? {
                RegistrationResult::Registered(credential) => {
                    let path = credential_path(args, "out", id);
                    save_credential(&path, &credential)?;
                    println!("Registered. Your pseudonym is {}", credential.pseudonym);
                    println!("Credential stored in {}", path.display());
                    Ok(0)
                }
                RegistrationResult::IdInvalid => {
                    println!("Identity {} is not eligible to vote.", id);
                    Ok(REFUSED)
                }
                RegistrationResult::IdUsed => {
                    println!("Identity {} has already registered.", id);
                    Ok(REFUSED)
                }
                RegistrationResult::Rejected => {
                    println!("The authority rejected the registration.");
                    Ok(REFUSED)
                }
            }
        }
        Some(("vote", args)) => {
            let id = args.get_one::<BigUint>("id").expect("required");
            let credential = load_credential(credential_path(args, "credential", id))?;
            let vote = match string_arg(args, "vote") {
                "yes" => Vote::Yes,
                _ => Vote::No,
            };
            let stream = connect(string_arg(args, "connect"), timeout(args))?;
            match cast_vote(&stream, &credential, id, vote)? {
                BallotResult::Accepted => {
                    println!("Thank you, your ballot was counted.");
                    Ok(0)
                }
                BallotResult::Invalid => {
                    println!("The collector refused the ballot as invalid.");
                    Ok(REFUSED)
                }
                BallotResult::Fraud(identity) => {
                    println!("Pseudonym already used; the collector identified voter {}.", identity);
                    Ok(REFUSED)
                }
            }
        }
        _ => unreachable!("subcommand is required"),
    }
}

fn main() {
    init_logging();
    let args = cli().get_matches();
    match run(&args) {
        Ok(code) => process::exit(code),
        Err(err) => {
            error!("{}", err);
            error!("Critical failure, shutting down");
            process::exit(1)
        }
    }
}
