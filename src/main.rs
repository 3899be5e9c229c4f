//! Thin CLI layer: parse args, styled output, and call into gwsup-core.
//! Crash-proof: panic caught and reported; all errors return Result.

use clap::{Arg, ArgAction, ArgMatches, Command};
use colored::Colorize;
use std::env;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};

use gwsup_core::release::DEFAULT_HOMEPAGE;
use gwsup_core::{
    Arch, Fetcher, GwsupError, HttpClient, InstallRequest, Os, Overrides, Pipeline, Platform, Release,
    ReleaseIndex, Settings, Sha256Digest,
};

// ---- UI helpers (no-op when stdout isn't a TTY) ----

fn use_color() -> bool {
    std::io::stdout().is_terminal() && env::var("NO_COLOR").unwrap_or_default().is_empty()
}

fn success(msg: &str) {
    if use_color() {
        println!("{}", msg.green());
    } else {
        println!("{}", msg);
    }
}

fn error(msg: &str) {
    if use_color() {
        eprintln!("{}", msg.red());
    } else {
        eprintln!("{}", msg);
    }
}

fn warning(msg: &str) {
    if use_color() {
        eprintln!("{}", msg.yellow());
    } else {
        eprintln!("{}", msg);
    }
}

fn info(msg: &str) {
    if use_color() {
        println!("{}", msg.cyan());
    } else {
        println!("{}", msg);
    }
}

fn dim(msg: &str) {
    if use_color() {
        println!("{}", msg.dimmed());
    } else {
        println!("{}", msg);
    }
}

fn platform_args() -> [Arg; 3] {
    [
        Arg::new("release")
            .long("release")
            .short('r')
            .help("Release version to use, e.g. 0.1.0 (default: latest published)"),
        Arg::new("os")
            .long("os")
            .help("Target OS: macos or linux (default: this host)"),
        Arg::new("arch")
            .long("arch")
            .help("Target CPU architecture: arm64 or x64 (default: this host)"),
    ]
}

fn bin_dir_arg() -> Arg {
    Arg::new("bin-dir")
        .long("bin-dir")
        .value_parser(clap::value_parser!(PathBuf))
        .help("Directory to install gws into (default: ~/.local/bin)")
}

fn json_arg() -> Arg {
    Arg::new("json")
        .long("json")
        .action(ArgAction::SetTrue)
        .help("Output machine-readable JSON")
}

fn cli() -> Command {
    Command::new("gwsup")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Resolve, verify, and install prebuilt gws release binaries")
        .after_help(
            "Examples:\n  gwsup install\n  gwsup install --release 0.1.0 --os linux --arch x64\n  gwsup resolve --release 0.1.0\n  gwsup test\n  gwsup doctor",
        )
        .arg(
            Arg::new("formula")
                .long("formula")
                .global(true)
                .value_parser(clap::value_parser!(PathBuf))
                .help("Formula JSON file with the release table (or set GWSUP_FORMULA)"),
        )
        .arg(
            Arg::new("quiet")
                .short('q')
                .long("quiet")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Minimal output"),
        )
        .subcommand(
            Command::new("resolve")
                .about("Print the download URL and sha256 for a release and platform")
                .args(platform_args())
                .arg(json_arg()),
        )
        .subcommand(Command::new("list").about("List known releases and platforms").arg(json_arg()))
        .subcommand(
            Command::new("install")
                .about("Download, verify, install, and smoke test gws")
                .args(platform_args())
                .arg(bin_dir_arg())
                .arg(
                    Arg::new("no-test")
                        .long("no-test")
                        .action(ArgAction::SetTrue)
                        .help("Skip running `gws --version` after install"),
                )
                .arg(
                    Arg::new("offline")
                        .long("offline")
                        .action(ArgAction::SetTrue)
                        .help("Only use verified archives from the cache (or set GWSUP_OFFLINE=1)"),
                )
                .arg(json_arg()),
        )
        .subcommand(
            Command::new("test")
                .about("Run `gws --version` on the installed binary")
                .arg(bin_dir_arg()),
        )
        .subcommand(
            Command::new("uninstall")
                .about("Remove the installed gws binary")
                .arg(bin_dir_arg()),
        )
        .subcommand(
            Command::new("digest")
                .about("Print the sha256 of a file (for publishing a release)")
                .arg(
                    Arg::new("file")
                        .required(true)
                        .value_parser(clap::value_parser!(PathBuf))
                        .help("File to hash"),
                ),
        )
        .subcommand(
            Command::new("formula")
                .about("Edit the formula file")
                .subcommand_required(true)
                .subcommand(
                    Command::new("add")
                        .about("Append a newly published release")
                        .arg(
                            Arg::new("release")
                                .long("release")
                                .short('r')
                                .required(true)
                                .help("Release version, e.g. 0.1.0"),
                        )
                        .arg(
                            Arg::new("base-url")
                                .long("base-url")
                                .default_value(DEFAULT_HOMEPAGE)
                                .help("Repository URL the release assets are published under"),
                        )
                        .arg(
                            Arg::new("digest")
                                .long("digest")
                                .required(true)
                                .action(ArgAction::Append)
                                .help("<os>_<arch>=<sha256>, once per platform"),
                        ),
                ),
        )
        .subcommand(
            Command::new("doctor")
                .about("Check the installed gws binary")
                .arg(bin_dir_arg())
                .arg(json_arg()),
        )
}

fn load_settings(sub: &ArgMatches) -> Result<Settings, String> {
    let cwd = env::current_dir().map_err(|e| e.to_string())?;
    let overrides = Overrides {
        bin_dir: sub
            .try_get_one::<PathBuf>("bin-dir")
            .ok()
            .flatten()
            .cloned(),
        cache_dir: None,
        formula: sub.get_one::<PathBuf>("formula").cloned(),
        offline: sub.try_get_one::<bool>("offline").ok().flatten().copied().unwrap_or(false),
    };
    Settings::load(&cwd, &overrides).map_err(|e| e.to_string())
}

fn load_index(settings: &Settings) -> Result<ReleaseIndex, String> {
    match &settings.formula {
        Some(path) => ReleaseIndex::load(path).map_err(|e| e.to_string()),
        None => Ok(ReleaseIndex::builtin()),
    }
}

fn target_platform(sub: &ArgMatches) -> Result<Platform, GwsupError> {
    let os = sub.get_one::<String>("os");
    let arch = sub.get_one::<String>("arch");
    if let (Some(os), Some(arch)) = (os, arch) {
        return Platform::parse(os, arch);
    }
    let host = Platform::current()?;
    Ok(Platform::new(
        os.map(|s| s.parse::<Os>()).transpose()?.unwrap_or(host.os),
        arch.map(|s| s.parse::<Arch>()).transpose()?.unwrap_or(host.arch),
    ))
}

fn install_request(sub: &ArgMatches, run_smoke_test: bool) -> Result<InstallRequest, GwsupError> {
    let version = sub
        .get_one::<String>("release")
        .map(|v| gwsup_core::parse_version(v))
        .transpose()?;
    Ok(InstallRequest {
        version,
        platform: target_platform(sub)?,
        run_smoke_test,
    })
}

fn pipeline<'a>(index: &'a ReleaseIndex, settings: &Settings, progress: bool) -> Pipeline<'a> {
    let client = HttpClient::new(
        settings.http_timeout_ms,
        settings.http_retries,
        settings.http_retry_backoff_ms,
    );
    let fetcher = Fetcher::new(client, settings.cache_dir.clone())
        .offline(settings.offline)
        .show_progress(progress);
    Pipeline::new(index, fetcher, settings.bin_dir.clone(), settings.smoke_timeout)
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, String> {
    serde_json::to_string_pretty(value).map_err(|e| e.to_string())
}

fn cmd_resolve(sub: &ArgMatches) -> Result<(), String> {
    let settings = load_settings(sub)?;
    let index = load_index(&settings)?;
    let p = pipeline(&index, &settings, false);
    let request = install_request(sub, false).map_err(|e| e.at(gwsup_core::Stage::Resolve).to_string())?;
    let asset = p.resolve(&request).map_err(|e| e.to_string())?;
    if sub.get_flag("json") {
        println!("{}", to_json(&asset)?);
    } else {
        println!("version  {}", asset.version);
        println!("platform {}", asset.platform);
        println!("url      {}", asset.url);
        println!("sha256   {}", asset.sha256);
        if asset.is_placeholder() {
            warning("This is a placeholder release and cannot be installed.");
        }
    }
    Ok(())
}

fn cmd_list(sub: &ArgMatches) -> Result<(), String> {
    let settings = load_settings(sub)?;
    let index = load_index(&settings)?;
    if sub.get_flag("json") {
        let releases: Vec<&Release> = index.releases().collect();
        println!("{}", to_json(&releases)?);
        return Ok(());
    }
    let mut any = false;
    for release in index.releases() {
        any = true;
        let platforms: Vec<String> = release.assets.keys().map(|p| p.to_string()).collect();
        let line = format!("{}  {}", release.version, platforms.join(" "));
        if release.is_placeholder() {
            dim(&format!("{}  (placeholder)", line));
        } else {
            println!("{}", line);
        }
    }
    if !any {
        dim("No releases in formula.");
    }
    Ok(())
}

fn cmd_install(sub: &ArgMatches) -> Result<(), String> {
    let json_out = sub.get_flag("json");
    if json_out {
        env::set_var("GWSUP_QUIET", "1");
    }
    let settings = load_settings(sub)?;
    let index = load_index(&settings)?;
    let progress = !json_out && !sub.get_flag("quiet") && std::io::stderr().is_terminal();
    let p = pipeline(&index, &settings, progress);
    let request = install_request(sub, !sub.get_flag("no-test"))
        .map_err(|e| e.at(gwsup_core::Stage::Resolve).to_string())?;

    let report = p.run(&request).map_err(|e| e.to_string())?;
    if json_out {
        println!("{}", to_json(&report)?);
        return Ok(());
    }
    if let Some(reason) = &report.smoke_skipped {
        warning(&format!("Smoke test skipped: {}", reason));
    }
    success(&format!(
        "Installed gws {} ({}) to {}",
        report.version,
        report.platform,
        report.installed.display()
    ));
    if !gwsup_core::utils::dir_on_path(&settings.bin_dir) {
        warning(&format!("{} is not on PATH.", settings.bin_dir.display()));
    }
    Ok(())
}

fn cmd_test(sub: &ArgMatches) -> Result<(), String> {
    let settings = load_settings(sub)?;
    let binary = gwsup_core::installed_path(&settings.bin_dir);
    let report = gwsup_core::smoke_test(&binary, settings.smoke_timeout)
        .map_err(|e| e.at(gwsup_core::Stage::Test).to_string())?;
    if !report.stdout.is_empty() {
        dim(&report.stdout);
    }
    success(&format!("{} --version exited 0", binary.display()));
    Ok(())
}

fn cmd_uninstall(sub: &ArgMatches) -> Result<(), String> {
    let settings = load_settings(sub)?;
    if gwsup_core::uninstall(&settings.bin_dir).map_err(|e| e.to_string())? {
        success(&format!("Removed {}", gwsup_core::installed_path(&settings.bin_dir).display()));
    } else {
        dim("gws is not installed.");
    }
    Ok(())
}

fn cmd_digest(sub: &ArgMatches) -> Result<(), String> {
    let Some(file) = sub.get_one::<PathBuf>("file") else {
        return Err("missing file".to_string());
    };
    let digest = Sha256Digest::of_file(file).map_err(|e| e.to_string())?;
    println!("{}  {}", digest, file.display());
    Ok(())
}

fn parse_digest_arg(s: &str) -> Result<(Platform, Sha256Digest), String> {
    let (platform, hex) = s
        .split_once('=')
        .ok_or_else(|| format!("expected <os>_<arch>=<sha256>, got {:?}", s))?;
    let platform: Platform = platform.parse().map_err(|e: GwsupError| e.to_string())?;
    let digest: Sha256Digest = hex.parse().map_err(|e: GwsupError| e.to_string())?;
    Ok((platform, digest))
}

fn cmd_formula_add(sub: &ArgMatches) -> Result<(), String> {
    let settings = load_settings(sub)?;
    let path: &Path = settings
        .formula
        .as_deref()
        .ok_or("no formula file: pass --formula or set GWSUP_FORMULA")?;
    let mut index = if path.exists() {
        ReleaseIndex::load(path).map_err(|e| e.to_string())?
    } else {
        ReleaseIndex::builtin()
    };

    let version = sub
        .get_one::<String>("release")
        .map(|v| gwsup_core::parse_version(v))
        .transpose()
        .map_err(|e| e.to_string())?
        .ok_or("missing --release")?;
    let base = sub
        .get_one::<String>("base-url")
        .map(String::as_str)
        .unwrap_or(DEFAULT_HOMEPAGE);
    let mut digests = Vec::new();
    for raw in sub.get_many::<String>("digest").into_iter().flatten() {
        let (platform, digest) = parse_digest_arg(raw)?;
        if digests.iter().any(|(p, _)| *p == platform) {
            return Err(format!("--digest given twice for {}", platform));
        }
        digests.push((platform, digest));
    }

    let release = Release::from_digests(base, version.clone(), digests);
    if index.append(release).map_err(|e| e.to_string())? {
        index.save(path).map_err(|e| e.to_string())?;
        gwsup_core::log(&settings.cache_dir, &format!("Added release {} to {}", version, path.display()));
        success(&format!("Added gws {} to {}", version, path.display()));
    } else {
        dim(&format!("gws {} is already in {} with the same assets.", version, path.display()));
    }
    Ok(())
}

fn cmd_doctor(sub: &ArgMatches) -> Result<(), String> {
    let json_out = sub.get_flag("json");
    if json_out {
        env::set_var("GWSUP_QUIET", "1");
    }
    let settings = load_settings(sub)?;
    let report = gwsup_core::check_installation(&settings.bin_dir, settings.smoke_timeout);
    if json_out {
        println!("{}", to_json(&report)?);
    } else {
        for d in &report.details {
            dim(d);
        }
        for w in &report.warnings {
            warning(&format!("warning: {}", w));
        }
        for issue in &report.issues {
            error(&format!("{}: {}", issue.kind, issue.message));
        }
        if report.is_healthy() {
            success("gws installation looks good.");
        }
    }
    if report.is_healthy() {
        Ok(())
    } else {
        Err(format!("doctor found {} issue(s)", report.issues.len()))
    }
}

fn run() -> Result<(), String> {
    let matches = cli().get_matches();
    let quiet = matches.get_flag("quiet")
        || matches
            .subcommand()
            .map(|(_, sub)| sub.get_flag("quiet"))
            .unwrap_or(false);
    if quiet {
        env::set_var("GWSUP_QUIET", "1");
    }

    match matches.subcommand() {
        Some(("resolve", sub)) => cmd_resolve(sub),
        Some(("list", sub)) => cmd_list(sub),
        Some(("install", sub)) => cmd_install(sub),
        Some(("test", sub)) => cmd_test(sub),
        Some(("uninstall", sub)) => cmd_uninstall(sub),
        Some(("digest", sub)) => cmd_digest(sub),
        Some(("formula", sub)) => match sub.subcommand() {
            Some(("add", add)) => cmd_formula_add(add),
            _ => Err("unknown formula subcommand".to_string()),
        },
        Some(("doctor", sub)) => cmd_doctor(sub),
        _ => {
            if use_color() {
                println!("{}", "gwsup".bright_cyan().bold());
            } else {
                println!("gwsup");
            }
            info("Install prebuilt gws release binaries with sha256 verification.");
            dim("\nRun `gwsup --help` for details.");
            Ok(())
        }
    }
}

fn main() {
    if !use_color() {
        colored::control::set_override(false);
    }

    let code = match std::panic::catch_unwind(run) {
        Ok(Ok(())) => 0,
        Ok(Err(e)) => {
            error(&format!("error: {}", e));
            1
        }
        Err(_) => {
            error("An unexpected error occurred. Please report this issue.");
            1
        }
    };
    std::process::exit(code);
}
