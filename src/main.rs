fn main() -> std::process::ExitCode {
    blocklaunch_lib::run()
}
