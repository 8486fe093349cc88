use std::collections::HashMap;
use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use std::time::Duration;

use clap::{error::ErrorKind, CommandFactory, Parser};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::cli::args::CliArgs;
use crate::cli::validation;
use crate::config::{self, ConfigFile};
use crate::fetch::{TransportKind, DEFAULT_MAX_CONTENT_READ};
use crate::output::{self, FindingWriter, OutputFormat};
use crate::resources::DEFAULT_MEMORY_CEILING_MB;
use crate::runner::{Options, Runner, RunnerError};
use crate::utils;
use crate::words::{WordConfig, DEFAULT_ENV_WORDS};

fn print_banner() {
    const BANNER: &str = r#"
       __            _____ __
  ____/ /_  ______  / __(_) /__
 / __  / / / / __ \/ /_/ / / _ \
/ /_/ / /_/ / / / / __/ / /  __/
\__,_/\__, /_/ /_/_/ /_/_/\___/
     /____/
       host-aware sensitive file discovery
    "#;
    print!("{}", BANNER);
    println!();
}

fn format_kv_line(label: &str, value: &str) {
    println!(":: {:<10}: {}", label, value);
}

fn render_custom_help() -> String {
    let cmd = CliArgs::command();
    let mut out = String::new();
    out.push_str(cmd.get_name());
    if let Some(version) = cmd.get_version() {
        out.push(' ');
        out.push_str(version);
    }
    out.push('\n');
    if let Some(long_about) = cmd.get_long_about().or(cmd.get_about()) {
        out.push('\n');
        out.push_str(&long_about.to_string());
        out.push('\n');
    }
    out.push_str("\nUsage: ");
    out.push_str(cmd.get_name());
    out.push_str(" [OPTIONS]\n\n");

    // grouped by help heading, in declaration order
    let mut sections: Vec<(String, Vec<&clap::Arg>)> = Vec::new();
    let mut section_idx: HashMap<String, usize> = HashMap::new();
    for arg in cmd.get_arguments().filter(|a| !a.is_hide_set()) {
        let heading = arg.get_help_heading().unwrap_or("Options").to_string();
        let idx = *section_idx.entry(heading.clone()).or_insert_with(|| {
            sections.push((heading, Vec::new()));
            sections.len() - 1
        });
        sections[idx].1.push(arg);
    }

    for (heading, args) in sections {
        out.push_str(&heading);
        out.push_str(":\n");
        for arg in args {
            let mut parts: Vec<String> = Vec::new();
            if let Some(short) = arg.get_short() {
                parts.push(format!("-{short}"));
            }
            if let Some(long) = arg.get_long() {
                parts.push(format!("--{long}"));
            }
            if let Some(aliases) = arg.get_visible_aliases() {
                parts.extend(aliases.into_iter().map(|a| format!("--{a}")));
            }
            let mut flags = parts.join(", ");
            if arg.get_action().takes_values() {
                let value_name = arg
                    .get_value_names()
                    .and_then(|names| names.first())
                    .map(|name| name.as_str())
                    .unwrap_or("VALUE");
                flags.push_str(&format!(" <{value_name}>"));
            }
            out.push_str(&format!("  {flags}\n"));
            if let Some(help) = arg.get_help() {
                let help = help.to_string();
                if !help.trim().is_empty() {
                    out.push_str(&format!("          {}\n", help.trim()));
                }
            }
        }
        out.push('\n');
    }
    out
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        _ => tracing::Level::DEBUG,
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("warn,dynfile={level}")));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .compact()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .try_init();
}

fn format_bool(value: bool) -> &'static str {
    if value {
        "true"
    } else {
        "false"
    }
}

#[derive(Clone, Debug)]
struct RunConfig {
    domains: Vec<String>,
    domains_file: Option<String>,
    paths_file: String,
    markers_file: Option<String>,
    base_paths_file: Option<String>,
    output: Option<String>,
    output_format: Option<OutputFormat>,
    no_color: bool,
    verbose: u8,
    /// Everything but the list inputs, which are loaded in `run_async`.
    options: Options,
}

fn csv_or(value: Option<String>, default: &[&str]) -> Vec<String> {
    match value {
        Some(v) => utils::parse_csv_list(&v),
        None => default.iter().map(|s| s.to_string()).collect(),
    }
}

fn build_run_config(args: CliArgs, cfg: ConfigFile) -> Result<RunConfig, String> {
    validation::validate(&args)?;

    let domains_file = args.domains.or(cfg.domains);
    if args.domain.is_empty() && domains_file.is_none() {
        return Err("at least one host must be specified (--domain or --domains)".to_string());
    }
    let paths_file = args
        .paths
        .or(cfg.paths)
        .ok_or_else(|| "a paths file must be specified (--paths)".to_string())?;

    let concurrency = args.concurrency.or(cfg.concurrency).unwrap_or(10);
    let rate = args.rate.or(cfg.rate).unwrap_or(0);
    let timeout = args.timeout.or(cfg.timeout).unwrap_or(12);
    let max_content_read = args
        .max_content_read
        .or(cfg.max_content_read)
        .unwrap_or(DEFAULT_MAX_CONTENT_READ);

    let headers_raw = args.headers.or(cfg.headers).unwrap_or_default();
    let headers = utils::parse_headers(&headers_raw)
        .map_err(|e| format!("invalid --headers '{headers_raw}': {e}"))?;

    let words = WordConfig {
        host_depth: args.host_depth.or(cfg.host_depth).unwrap_or(0),
        env_words: csv_or(args.env_append_words.or(cfg.env_words), DEFAULT_ENV_WORDS),
        append_envs: !(args.dont_append_envs || cfg.dont_append_envs.unwrap_or(false)),
        remove_envs: args.env_remove || cfg.env_remove.unwrap_or(false),
        append_bypasses: args.append_bypasses || cfg.append_bypasses.unwrap_or(false),
        max_words_per_host: args
            .max_generated_words_per_host
            .or(cfg.max_generated_words_per_host)
            .unwrap_or(0),
        ..WordConfig::default()
    };

    let fasthttp = args.fasthttp || cfg.fasthttp.unwrap_or(false);
    let options = Options {
        concurrency,
        rate,
        timeout: Duration::from_secs(timeout),
        max_content_read,
        min_content_size: args.min_content_size.or(cfg.min_content_size).unwrap_or(0),
        http_status: args.http_status.or(cfg.http_status).unwrap_or_default(),
        content_types: csv_or(args.content_types.or(cfg.content_types), &[]),
        disallowed_content_types: csv_or(
            args.disallowed_content_types.or(cfg.disallowed_content_types),
            &[],
        ),
        disallowed_strings: csv_or(
            args.disallowed_content_strings.or(cfg.disallowed_strings),
            &[],
        ),
        words,
        skip_root: args.skip_root_folder_check || cfg.skip_root_folder_check.unwrap_or(false),
        generate_words: !(args.dont_generate_paths || cfg.dont_generate_paths.unwrap_or(false)),
        ignore_base_path_slash: args.ignore_base_path_slash
            || cfg.ignore_base_path_slash.unwrap_or(false),
        force_http: args.force_http || cfg.force_http.unwrap_or(false),
        disable_duplicate_check: args.disable_duplicate_check
            || cfg.disable_duplicate_check.unwrap_or(false),
        headers,
        proxy: args.proxy.or(cfg.proxy).filter(|p| !p.trim().is_empty()),
        transport: if fasthttp {
            TransportKind::Fast
        } else {
            TransportKind::Standard
        },
        memory_ceiling_mb: args
            .memory_ceiling
            .or(cfg.memory_ceiling)
            .unwrap_or(DEFAULT_MEMORY_CEILING_MB),
        ..Options::default()
    };

    let output = args.output.or(cfg.output);
    let output_format = match args.output_format.or(cfg.output_format) {
        Some(raw) => Some(
            OutputFormat::parse(&raw)
                .ok_or_else(|| format!("invalid output format '{raw}', expected text or json"))?,
        ),
        None => None,
    };

    Ok(RunConfig {
        domains: args.domain,
        domains_file,
        paths_file,
        markers_file: args.markers.or(cfg.markers),
        base_paths_file: args.base_paths.or(cfg.base_paths),
        output,
        output_format,
        no_color: args.no_color || cfg.no_color.unwrap_or(false),
        verbose: args.verbose,
        options,
    })
}

async fn load_inputs(run: &RunConfig) -> Result<Options, String> {
    let mut options = run.options.clone();

    let mut hosts = run.domains.clone();
    if let Some(path) = run.domains_file.as_deref() {
        hosts.extend(
            utils::read_lines("domains", path)
                .await
                .map_err(|e| e.to_string())?,
        );
    }
    options.hosts = utils::prepare_hosts(hosts);

    options.paths = utils::read_lines("paths", &run.paths_file)
        .await
        .map_err(|e| e.to_string())?;

    options.markers = match run.markers_file.as_deref() {
        Some(path) => match utils::read_lines("markers", path).await {
            Ok(markers) => markers,
            Err(RunnerError::FileOpen { source, .. })
                if source.kind() == std::io::ErrorKind::NotFound =>
            {
                Vec::new()
            }
            Err(e) => return Err(e.to_string()),
        },
        None => Vec::new(),
    };
    if options.markers.is_empty() {
        println!(
            "{}",
            "[!] Warning: the marker list is empty, the scan will rely on rules only."
                .yellow()
        );
    }

    if let Some(path) = run.base_paths_file.as_deref() {
        options.base_paths = utils::read_lines("base_paths", path)
            .await
            .map_err(|e| e.to_string())?;
    }
    Ok(options)
}

fn open_output(
    path: &str,
    format: Option<OutputFormat>,
) -> Result<FindingWriter<BufWriter<File>>, String> {
    let format = format
        .or_else(|| output::infer_format_from_path(path))
        .unwrap_or(OutputFormat::Text);
    let file = File::create(config::expand_tilde(path))
        .map_err(|e| format!("failed to open output file: {e}"))?;
    FindingWriter::new(BufWriter::new(file), format)
        .map_err(|e| format!("failed to write output file: {e}"))
}

async fn run_async(run: RunConfig) -> Result<(), String> {
    if run.no_color {
        colored::control::set_override(false);
    }
    print_banner();

    let options = load_inputs(&run).await?;
    let runner = Runner::new(options).map_err(|e| e.to_string())?;
    let opts = runner.options();

    format_kv_line("Hosts", &opts.hosts.len().to_string());
    format_kv_line("Paths", &opts.paths.len().to_string());
    format_kv_line("Markers", &opts.markers.len().to_string());
    if !opts.base_paths.is_empty() {
        format_kv_line("Base paths", &opts.base_paths.join(","));
    }
    format_kv_line(
        "Threads",
        &format!(
            "{} (rate {}/s)",
            opts.concurrency,
            if opts.rate == 0 {
                opts.concurrency as u64
            } else {
                opts.rate as u64
            }
        ),
    );
    format_kv_line("Timeout", &format!("{}s", opts.timeout.as_secs()));
    format_kv_line("Max read", &utils::format_bytes(opts.max_content_read as u64));
    if !opts.http_status.trim().is_empty() {
        format_kv_line("Status", opts.http_status.trim());
    }
    if opts.min_content_size > 0 {
        format_kv_line("Min size", &format!("{} bytes", opts.min_content_size));
    }
    format_kv_line("Words", format_bool(opts.generate_words));
    format_kv_line("Dedup", format_bool(!opts.disable_duplicate_check));
    for (name, value) in opts.headers.iter() {
        format_kv_line("Header", &format!("{name}: {value}"));
    }
    if let Some(proxy) = opts.proxy.as_deref() {
        format_kv_line("Proxy", proxy);
    }
    if let Some(path) = run.output.as_deref() {
        format_kv_line("Output", path);
    }
    println!();

    let pb = ProgressBar::new(0);
    pb.set_draw_target(ProgressDrawTarget::stderr());
    pb.enable_steady_tick(Duration::from_millis(200));
    pb.set_style(
        ProgressStyle::with_template(":: Progress: {msg} :: Duration: [{elapsed_precise}]")
            .map_err(|e| format!("failed to build progress bar style: {e}"))?,
    );

    let mut writer = match run.output.as_deref() {
        Some(path) => Some(open_output(path, run.output_format)?),
        None => None,
    };
    let mut write_error: Option<std::io::Error> = None;
    let progress_pb = pb.clone();
    let summary = runner
        .run(
            |finding| {
                pb.println(output::render_finding(&finding));
                if write_error.is_some() {
                    return;
                }
                if let Some(writer) = writer.as_mut() {
                    if let Err(e) = writer.write_finding(&finding) {
                        write_error = Some(e);
                    }
                }
            },
            move |snapshot| {
                progress_pb.set_length(snapshot.total);
                progress_pb.set_position(snapshot.processed);
                progress_pb.set_message(output::render_progress(&snapshot));
            },
        )
        .await
        .map_err(|e| e.to_string())?;
    pb.finish_and_clear();

    if let Some(e) = write_error {
        return Err(format!("failed to write output file: {e}"));
    }
    if let Some(writer) = writer {
        writer
            .finish(&summary)
            .map_err(|e| format!("failed to write output file: {e}"))?;
    }

    println!();
    println!("{}", output::render_summary(&summary));
    Ok(())
}

pub fn run_cli() -> Result<(), String> {
    let args = match CliArgs::try_parse() {
        Ok(args) => args,
        Err(e) => match e.kind() {
            ErrorKind::DisplayHelp => {
                print!("{}", render_custom_help());
                return Ok(());
            }
            ErrorKind::DisplayVersion => {
                let cmd = CliArgs::command();
                print!("{}", cmd.render_version());
                return Ok(());
            }
            _ => return Err(e.to_string()),
        },
    };

    init_tracing(args.verbose);

    let config_path: Option<PathBuf> = match args.config.as_deref() {
        Some(path) => Some(config::expand_tilde(path)),
        None => config::default_config_path(),
    };
    if args.write_config {
        let path = config_path.ok_or_else(|| "cannot determine config path".to_string())?;
        config::ensure_default_config_file(&path)?;
        println!("config written to {}", path.display());
        return Ok(());
    }
    let cfg = match config_path.as_ref() {
        Some(path) => config::load_config(path, args.config.is_none())?,
        None => ConfigFile::default(),
    };

    let run = build_run_config(args, cfg)?;
    tracing::debug!(verbose = run.verbose, "configuration loaded");

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| format!("failed to build runtime: {e}"))?;

    rt.block_on(run_async(run))?;
    Ok(())
}
