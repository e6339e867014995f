use std::io::IsTerminal;

use serde::Serialize;
use serde_json::Value;
use tapo_core::{Credentials, Error};

/// Exit status for an ordinary failure.
pub const EXIT_FAILURE: i32 = 1;

/// Exit status when the plug keeps answering with the same device error.
pub const EXIT_PERSISTENT_FAULT: i32 = 2;

/// Read password securely based on the provided options.
///
/// # Priority
///
/// 1. If `password_stdin` is true, read one line from stdin
/// 2. Otherwise, prompt interactively (if terminal is available)
pub fn read_password(password_stdin: bool, prompt: &str) -> Result<String, String> {
    if password_stdin {
        let mut input = String::new();
        std::io::stdin()
            .read_line(&mut input)
            .map_err(|e| format!("Failed to read password from stdin: {}", e))?;
        return Ok(input.trim().to_string());
    }

    if std::io::stdin().is_terminal() {
        eprint!("{}: ", prompt);
        rpassword::read_password().map_err(|e| format!("Failed to read password: {}", e))
    } else {
        Err("No password provided. Use --password-stdin when piping input.".to_string())
    }
}

/// Get credentials from CLI options and environment.
///
/// Password is read from TAPO_PASSWORD env var, stdin (if --password-stdin),
/// or interactively prompted. Tapo plugs refuse unauthenticated control, so a
/// username is mandatory.
pub fn get_credentials(
    username: Option<String>,
    password_stdin: bool,
) -> Result<Credentials, String> {
    let Some(user) = username else {
        return Err("No username provided. Use --username or TAPO_USERNAME.".to_string());
    };

    if let Ok(pass) = std::env::var("TAPO_PASSWORD") {
        return Ok(Credentials::new(user, pass));
    }

    let prompt = format!("Password for {}", user);
    let pass = read_password(password_stdin, &prompt)?;
    Ok(Credentials::new(user, pass))
}

/// Parse the optional JSON params of a raw command. Params must be an object.
pub fn parse_params(params: Option<&str>) -> Result<Option<Value>, String> {
    let Some(raw) = params else {
        return Ok(None);
    };
    match serde_json::from_str::<Value>(raw) {
        Ok(value @ Value::Object(_)) => Ok(Some(value)),
        Ok(_) => Err("Params must be a JSON object".to_string()),
        Err(e) => Err(format!("Invalid JSON params: {}", e)),
    }
}

/// Serialize a command result for printing.
pub fn to_json<T: Serialize>(value: T) -> Result<Value, Error> {
    Ok(serde_json::to_value(value)?)
}

/// Print a value as a single JSON line.
pub fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string(value) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Error: could not encode output: {}", e),
    }
}

/// Process exit status for a failed command.
pub fn exit_code(error: &Error) -> i32 {
    if error.is_persistent() {
        EXIT_PERSISTENT_FAULT
    } else {
        EXIT_FAILURE
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tapo_core::ErrorCode;

    #[test]
    fn test_parse_params() {
        assert_eq!(parse_params(None).unwrap(), None);
        assert_eq!(
            parse_params(Some(r#"{"device_on":true}"#)).unwrap(),
            Some(serde_json::json!({"device_on": true}))
        );
        assert!(parse_params(Some("[1,2]")).is_err());
        assert!(parse_params(Some("{not json")).is_err());
    }

    #[test]
    fn test_missing_username_is_an_error() {
        assert!(get_credentials(None, false).is_err());
    }

    #[test]
    fn test_exit_code() {
        let persistent = Error::PersistentFault {
            code: ErrorCode::Unreachable,
            attempts: 3,
        };
        assert_eq!(exit_code(&persistent), EXIT_PERSISTENT_FAULT);
        assert_eq!(
            exit_code(&Error::Device(ErrorCode::Unreachable)),
            EXIT_FAILURE
        );
        assert_eq!(exit_code(&Error::Timeout("10s".into())), EXIT_FAILURE);
    }
}
