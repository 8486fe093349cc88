use clap::{ArgAction, Parser};

#[derive(Parser, Debug, Clone)]
#[command(
    name = "dynfile",
    version,
    about = "host-aware sensitive file discovery tool",
    long_about = "dynfile probes every host for sensitive files, under the bare host and under path segments derived from the hostname itself (vendorgo.abc.target.com -> /vendorgo/, /vendorgo-qa/, ...).\n\nExamples:\n  dynfile -d vendorgo.abc.target.com --paths paths.txt --markers markers.txt\n  dynfile --domains hosts.txt --paths paths.txt -c 50 --http-status 200 --min-content-size 100\n  dynfile --domains hosts.txt --paths paths.txt --config ~/.dynfile/config.yml\n\nTip: without --markers every configured rule (status, size, content type) has to pass."
)]
pub struct CliArgs {
    #[arg(
        short = 'v',
        long = "verbose",
        action = ArgAction::Count,
        help_heading = "Output",
        help = "Increase verbosity (-v logs errors and duplicates, -vv debug)."
    )]
    pub verbose: u8,

    #[arg(
        short = 'n',
        long = "no-color",
        visible_alias = "nc",
        help_heading = "Output",
        help = "Disable colored output."
    )]
    pub no_color: bool,

    #[arg(
        short = 'o',
        long = "output",
        value_name = "FILE",
        help_heading = "Output",
        help = "Also write findings to FILE."
    )]
    pub output: Option<String>,

    #[arg(
        long = "output-format",
        visible_alias = "of",
        value_name = "FORMAT",
        help_heading = "Output",
        help = "Output file format: text or json (inferred from the extension by default)."
    )]
    pub output_format: Option<String>,

    #[arg(
        short = 'd',
        long = "domain",
        value_name = "HOST",
        action = ArgAction::Append,
        help_heading = "Input",
        help = "Host to scan (repeatable)."
    )]
    pub domain: Vec<String>,

    #[arg(
        long = "domains",
        value_name = "FILE",
        help_heading = "Input",
        help = "Load hosts from a file (one per line, '#' comments)."
    )]
    pub domains: Option<String>,

    #[arg(
        short = 'p',
        long = "paths",
        value_name = "FILE",
        help_heading = "Input",
        help = "File with the paths to probe ('##' comments)."
    )]
    pub paths: Option<String>,

    #[arg(
        short = 'm',
        long = "markers",
        value_name = "FILE",
        help_heading = "Input",
        help = "File with body markers, plain text or 'regex:<pattern>'."
    )]
    pub markers: Option<String>,

    #[arg(
        long = "base-paths",
        visible_alias = "bp",
        value_name = "FILE",
        help_heading = "Input",
        help = "File with base paths every path is also probed under."
    )]
    pub base_paths: Option<String>,

    #[arg(
        short = 'C',
        long = "config",
        visible_alias = "cfg",
        value_name = "FILE",
        help_heading = "Input",
        help = "Path to config file (defaults to ~/.dynfile/config.yml)."
    )]
    pub config: Option<String>,

    #[arg(
        long = "write-config",
        help_heading = "Input",
        help = "Write a default config file to the config path and exit."
    )]
    pub write_config: bool,

    #[arg(
        short = 'c',
        long = "concurrency",
        value_name = "N",
        help_heading = "Performance",
        help = "Requests in flight at once."
    )]
    pub concurrency: Option<usize>,

    #[arg(
        short = 'r',
        long = "rate",
        value_name = "RPS",
        help_heading = "Performance",
        help = "Request rate limit (requests per second, defaults to concurrency)."
    )]
    pub rate: Option<u32>,

    #[arg(
        short = 't',
        long = "timeout",
        value_name = "SECONDS",
        help_heading = "Performance",
        help = "Per request timeout in seconds."
    )]
    pub timeout: Option<u64>,

    #[arg(
        long = "max-content-read",
        visible_alias = "max-content-size",
        value_name = "BYTES",
        help_heading = "Performance",
        help = "Maximum bytes of each body to read."
    )]
    pub max_content_read: Option<usize>,

    #[arg(
        long = "memory-ceiling",
        value_name = "MIB",
        help_heading = "Performance",
        help = "Pause URL generation while memory use is above this (0 disables)."
    )]
    pub memory_ceiling: Option<u64>,

    #[arg(
        long = "fasthttp",
        help_heading = "Performance",
        help = "Use the low overhead transport (ignores --proxy)."
    )]
    pub fasthttp: bool,

    #[arg(
        long = "min-content-size",
        visible_alias = "min-size",
        value_name = "BYTES",
        help_heading = "Rules",
        help = "Minimum response size for a rule match (0 = off)."
    )]
    pub min_content_size: Option<u64>,

    #[arg(
        short = 's',
        long = "http-status",
        visible_alias = "status",
        value_name = "CODES",
        help_heading = "Rules",
        help = "Accepted status codes for a rule match (comma-separated)."
    )]
    pub http_status: Option<String>,

    #[arg(
        long = "content-types",
        value_name = "LIST",
        help_heading = "Rules",
        help = "Accepted content type substrings (comma-separated)."
    )]
    pub content_types: Option<String>,

    #[arg(
        long = "disallowed-content-types",
        value_name = "LIST",
        help_heading = "Rules",
        help = "Content type substrings that are never reported (comma-separated)."
    )]
    pub disallowed_content_types: Option<String>,

    #[arg(
        long = "disallowed-content-strings",
        value_name = "LIST",
        help_heading = "Rules",
        help = "Body substrings that are never reported (comma-separated, case-insensitive)."
    )]
    pub disallowed_content_strings: Option<String>,

    #[arg(
        long = "host-depth",
        value_name = "N",
        help_heading = "Words",
        help = "Only use the first N host labels for words (0 = all)."
    )]
    pub host_depth: Option<usize>,

    #[arg(
        long = "env-append-words",
        value_name = "LIST",
        help_heading = "Words",
        help = "Environment words appended to generated words (comma-separated)."
    )]
    pub env_append_words: Option<String>,

    #[arg(
        long = "dont-append-envs",
        help_heading = "Words",
        help = "Do not append environment words."
    )]
    pub dont_append_envs: bool,

    #[arg(
        long = "env-remove",
        help_heading = "Words",
        help = "Also try generated words with their environment suffix stripped."
    )]
    pub env_remove: bool,

    #[arg(
        long = "append-bypasses",
        help_heading = "Words",
        help = "Also try generated words with ';' and '..;' appended."
    )]
    pub append_bypasses: bool,

    #[arg(
        long = "dont-generate-paths",
        help_heading = "Words",
        help = "Only probe the root and base paths, no host derived words."
    )]
    pub dont_generate_paths: bool,

    #[arg(
        long = "max-generated-words-per-host",
        visible_alias = "mgw",
        value_name = "N",
        help_heading = "Words",
        help = "Cap on generated words per host (0 = unlimited)."
    )]
    pub max_generated_words_per_host: Option<usize>,

    #[arg(
        long = "skip-root-folder-check",
        help_heading = "Scan",
        help = "Do not probe paths directly under the host."
    )]
    pub skip_root_folder_check: bool,

    #[arg(
        long = "ignore-base-path-slash",
        help_heading = "Scan",
        help = "Join host and base path without a '/'."
    )]
    pub ignore_base_path_slash: bool,

    #[arg(
        long = "force-http",
        help_heading = "Scan",
        help = "Use http:// for every host."
    )]
    pub force_http: bool,

    #[arg(
        long = "disable-duplicate-check",
        help_heading = "Scan",
        help = "Report every match, even same sized ones on the same host."
    )]
    pub disable_duplicate_check: bool,

    #[arg(
        short = 'H',
        long = "headers",
        value_name = "HEADERS",
        help_heading = "HTTP",
        help = "Extra request headers ('Name:Value,Name:Value')."
    )]
    pub headers: Option<String>,

    #[arg(
        short = 'x',
        long = "proxy",
        value_name = "URL",
        help_heading = "HTTP",
        help = "Proxy URL (e.g. http://127.0.0.1:8080)."
    )]
    pub proxy: Option<String>,
}
