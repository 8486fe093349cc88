use colored::Colorize;

fn main() {
    if let Err(e) = dynfile::app::run_cli() {
        eprintln!("{} {}", "[✘] Error:".red(), e);
        std::process::exit(1);
    }
}
