/// Tunables for the dispatcher (§4.7). None of these are read from the
/// environment by the core itself (§6: "no environment variables are read
/// by the core") — `Config::default()` is a plain literal default, and a
/// caller embedding this crate in a service is expected to override fields
/// the way the teacher's own `Config` overrides `server_port`/`command_timeout`.
#[derive(Debug, Clone)]
pub struct Config {
    /// Magic prefix prepended to CLI console echoes by the `concat` helper
    /// (variant A correlation, §4.5). Must not collide with ordinary GDB
    /// console output.
    pub cli_echo_token: String,
    /// Upper bound, in characters, on a single Python helper script sent
    /// during `init()` (§4.7). Scripts over this are rejected with
    /// `Error::Usage` without touching the subprocess.
    pub script_size_ceiling: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cli_echo_token: "GDBJS^".to_string(),
            script_size_ceiling: 3500,
        }
    }
}
