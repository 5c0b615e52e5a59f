/// The supported families of SIMCom modules, detected from the `AT+CGMM`
/// model string during init.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ModemFamily {
    /// A76xx series (e.g. `A7670E-LASE`). The default when the model string
    /// is not recognised.
    A76xx,
    /// SIM8xx series (e.g. `SIMCOM_SIM868`).
    Sim8xx,
}

impl ModemFamily {
    pub fn from_model(model: &str) -> Self {
        if model.starts_with("SIMCOM_SIM8") {
            Self::Sim8xx
        } else {
            Self::A76xx
        }
    }

    /// Whether the module frames the `> ` prompt after `AT+CMGS` as a line.
    ///
    /// SIM8xx modules do not, so the prompt is synthesised right after the
    /// header command is written.
    pub fn frames_cmgs_prompt(&self) -> bool {
        matches!(self, Self::A76xx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_detection() {
        assert_eq!(ModemFamily::from_model("SIMCOM_SIM868"), ModemFamily::Sim8xx);
        assert_eq!(ModemFamily::from_model("A7670E-LASE"), ModemFamily::A76xx);
        assert_eq!(ModemFamily::from_model("something else"), ModemFamily::A76xx);
    }
}
