//! `doctor_cli.py`: check the Python environment.

use super::ScriptArgs;

pub const DOCTOR_SCRIPT: &str = "doctor_cli.py";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DoctorRequest;

impl ScriptArgs for DoctorRequest {
    fn script(&self) -> &'static str {
        DOCTOR_SCRIPT
    }

    fn to_args(&self) -> Vec<String> {
        ["--json_out", "--case", "start"].map(String::from).to_vec()
    }
}
