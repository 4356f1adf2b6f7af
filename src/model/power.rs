use serde_json::{Map, Value};

use super::{Degraded, Field};

/// Fields pulled from one power-profiling report.
///
/// Text fields default to an empty string, numeric ones to `"0"`.
#[derive(Clone, Debug, PartialEq)]
pub struct PowerReport {
    pub tool_version: Field<String>,
    pub kernel_version: Field<String>,
    pub system_name: Field<String>,
    pub cpu_info: Field<String>,
    pub os_info: Field<String>,
    pub discharge_rate: Field<String>,
    pub discharge_unit: Field<String>,
    pub baseline_power: Field<String>,
    pub baseline_unit: Field<String>,
    pub signature_power: Field<String>,
    pub signature_unit: Field<String>,
}

impl PowerReport {
    pub const COLUMNS: [&'static str; 11] = [
        "Powertop Version",
        "Kernel Version",
        "System Name",
        "CPU Stats",
        "OS Stats",
        "Power Usage",
        "Unit",
        "Baseline Power",
        "Unit",
        "Signatures Power",
        "Signatures Unit",
    ];

    /// Every field at its default, all for the same reason.
    pub fn defaulted(reason: Degraded) -> Self {
        let text = || Field::defaulted(String::new(), reason.clone());
        let number = || Field::defaulted("0".to_string(), reason.clone());
        Self {
            tool_version: text(),
            kernel_version: text(),
            system_name: text(),
            cpu_info: text(),
            os_info: text(),
            discharge_rate: number(),
            discharge_unit: text(),
            baseline_power: number(),
            baseline_unit: text(),
            signature_power: number(),
            signature_unit: text(),
        }
    }

    fn fields(&self) -> [(&'static str, &Field<String>); 11] {
        [
            ("tool_version", &self.tool_version),
            ("kernel_version", &self.kernel_version),
            ("system_name", &self.system_name),
            ("cpu_info", &self.cpu_info),
            ("os_info", &self.os_info),
            ("discharge_rate", &self.discharge_rate),
            ("discharge_unit", &self.discharge_unit),
            ("baseline_power", &self.baseline_power),
            ("baseline_unit", &self.baseline_unit),
            ("signature_power", &self.signature_power),
            ("signature_unit", &self.signature_unit),
        ]
    }

    /// Field values in [`Self::COLUMNS`] order.
    pub fn values(&self) -> Vec<String> {
        self.fields().iter().map(|(_, field)| field.render()).collect()
    }

    pub fn degraded_fields(&self) -> Vec<&'static str> {
        self.fields()
            .iter()
            .filter(|(_, field)| field.is_defaulted())
            .map(|(name, _)| *name)
            .collect()
    }

    /// Flat name/value object, used for the startup summary.
    pub fn to_json(&self) -> Value {
        let map: Map<String, Value> = self
            .fields()
            .iter()
            .map(|(name, field)| ((*name).to_string(), Value::String(field.render())))
            .collect();
        Value::Object(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaulted_report_uses_documented_defaults() {
        let report = PowerReport::defaulted(Degraded::ToolNotRunning);
        assert_eq!(
            report.values(),
            vec!["", "", "", "", "", "0", "", "0", "", "0", ""]
        );
        assert_eq!(report.degraded_fields().len(), PowerReport::COLUMNS.len());
    }

    #[test]
    fn json_summary_has_every_field() {
        let report = PowerReport::defaulted(Degraded::ToolNotRunning);
        let json = report.to_json();
        assert_eq!(json["discharge_rate"], "0");
        assert_eq!(json.as_object().map(|m| m.len()), Some(11));
    }
}
