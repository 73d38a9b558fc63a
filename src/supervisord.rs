use std::io::{self, Write};

use crate::models::ProgramRecord;

// Fixed supervisor settings: everything logs to the inherited stdout stream
// with rotation disabled, and the supervisor itself stays in the foreground.
const LOG_TARGET: &str = "/dev/stdout";
const LOG_MAXBYTES: &str = "0";
const LOG_BACKUPS: &str = "0";

/// A string as a JSON literal, the quoting supervisord expects around
/// environment values.
pub fn json_string(value: &str) -> String {
    serde_json::Value::String(value.to_owned()).to_string()
}

#[derive(Clone, Debug, Default)]
pub struct GlobalSection {
    /// The serialized env-file pairs, merged into every program's
    /// environment by the supervisor.
    pub environment: String,
}

#[derive(Clone, Debug)]
pub struct SupervisordConfig {
    pub global: GlobalSection,
    pub programs: Vec<ProgramRecord>,
}

impl SupervisordConfig {
    /// Writes the whole document: the global section first, then one program
    /// section per service in manifest order. Section order is cosmetic; the
    /// supervisor starts programs by their priority field.
    pub fn write_to(&self, out: &mut impl Write) -> io::Result<()> {
        writeln!(out, "[supervisord]")?;
        writeln!(out, "logfile = {}", LOG_TARGET)?;
        writeln!(out, "logfile_maxbytes = {}", LOG_MAXBYTES)?;
        writeln!(out, "logfile_backups = {}", LOG_BACKUPS)?;
        writeln!(out, "loglevel = debug")?;
        writeln!(out, "nodaemon = true")?;
        writeln!(out, "nocleanup = true")?;
        writeln!(out, "environment = {}", self.global.environment)?;
        writeln!(out)?;

        for program in self.programs.iter() {
            writeln!(out, "[program:{}]", program.name.0)?;
            writeln!(out, "command = {}", program.command)?;
            writeln!(out, "stdout_logfile = {}", LOG_TARGET)?;
            writeln!(out, "stdout_logfile_maxbytes = {}", LOG_MAXBYTES)?;
            writeln!(out, "stdout_logfile_backups = {}", LOG_BACKUPS)?;
            if let Some(environment) = &program.environment {
                writeln!(out, "environment = {}", environment)?;
            }
            writeln!(out, "priority = {}", program.priority)?;
            writeln!(out, "autorestart = {}", program.autorestart)?;
            writeln!(out)?;
        }

        Ok(())
    }
}
