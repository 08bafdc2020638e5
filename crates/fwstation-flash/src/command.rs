//! Command template expansion

use crate::error::FlashError;
use std::path::Path;

/// A concrete flashing tool invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlashCommand {
    /// Executable
    pub program: String,
    /// Arguments after substitution
    pub args: Vec<String>,
}

impl FlashCommand {
    /// Expand `template` for one device.
    ///
    /// The template is split on whitespace before `{port}`, `{firmware}` and
    /// `{baudrate}` are substituted, so a substituted path containing spaces
    /// stays a single argument.
    pub fn from_template(
        template: &str,
        port: &str,
        firmware: &Path,
        baudrate: u32,
    ) -> Result<Self, FlashError> {
        let firmware = firmware.display().to_string();
        let baudrate = baudrate.to_string();

        let mut tokens = template.split_whitespace().map(|token| {
            token
                .replace("{port}", port)
                .replace("{firmware}", &firmware)
                .replace("{baudrate}", &baudrate)
        });

        let program = tokens.next().ok_or(FlashError::EmptyTemplate)?;
        Ok(Self {
            program,
            args: tokens.collect(),
        })
    }

    /// Program name of a template without expanding it
    pub fn program_of(template: &str) -> Option<&str> {
        template.split_whitespace().next()
    }

    /// Command line for logs
    pub fn display_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn substitutes_every_placeholder() -> Result<(), FlashError> {
        let command = FlashCommand::from_template(
            "avrdude -p m328p -c arduino -P {port} -b {baudrate} -U flash:w:{firmware}:i",
            "/dev/ttyACM0",
            &PathBuf::from("/media/fw/firmware.hex"),
            115_200,
        )?;
        assert_eq!(command.program, "avrdude");
        assert_eq!(
            command.args,
            vec![
                "-p",
                "m328p",
                "-c",
                "arduino",
                "-P",
                "/dev/ttyACM0",
                "-b",
                "115200",
                "-U",
                "flash:w:/media/fw/firmware.hex:i",
            ]
        );
        Ok(())
    }

    #[test]
    fn path_with_spaces_stays_one_argument() -> Result<(), FlashError> {
        let command = FlashCommand::from_template(
            "esptool.py --port {port} write_flash 0x0 {firmware}",
            "/dev/ttyUSB0",
            &PathBuf::from("/media/My Stick/fw.bin"),
            921_600,
        )?;
        assert_eq!(command.args.last().map(String::as_str), Some("/media/My Stick/fw.bin"));
        assert_eq!(command.args.len(), 5);
        Ok(())
    }

    #[test]
    fn blank_template_is_rejected() {
        let result = FlashCommand::from_template("   ", "/dev/ttyUSB0", Path::new("fw"), 9600);
        assert!(matches!(result, Err(FlashError::EmptyTemplate)));
    }

    #[test]
    fn program_of_template() {
        assert_eq!(FlashCommand::program_of("esptool.py --port {port}"), Some("esptool.py"));
        assert_eq!(FlashCommand::program_of(""), None);
    }
}
