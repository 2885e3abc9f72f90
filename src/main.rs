fn main() -> std::process::ExitCode {
    gsm_console_lib::run()
}
