use serde::{Deserialize, Serialize};
use std::path::Path;

/// Parameters handed to the external `signal-server` RF-coverage tool.
///
/// Required fields mirror the tool's mandatory CLI flags; everything else is
/// optional and only appended to the command line when set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalServerConfig {
    pub sdf_directory: String,
    pub output_file: String,
    pub latitude: f64,
    pub longitude: f64,
    pub tx_height_m: f64,
    pub frequency_mhz: f64,
    pub erp_watts: f64,
    pub propagation_model: PropagationModel,
    pub radius_km: f64,
    pub resolution: u32,

    pub rx_height_m: Option<f64>,
    pub antenna_pattern_file: Option<String>,
    pub antenna_gain_dbi: Option<f64>,
    pub polarization: Option<Polarization>,
    pub clutter_file: Option<String>,
    pub terrain_multiplier: Option<f64>,
    pub terrain_db_adjust: Option<f64>,
    pub signal_threshold_dbm: Option<f64>,
    pub color_file: Option<String>,
    pub ked_refractivity: Option<f64>,
    pub earth_dielectric: Option<f64>,
    pub earth_conductivity: Option<f64>,
    pub climate_zone: Option<u8>,
    pub knife_edge_diffraction: Option<bool>,
    pub high_resolution: Option<bool>,
    pub generate_kml: Option<bool>,
    pub generate_geotiff: Option<bool>,
    pub verbose: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PropagationModel {
    Itwom,
    LongleyRice,
    Hata,
    Ecc33,
    Sui,
    Cost231,
    FreeSpace,
    Ericsson,
    Plog,
    Soil,
}

impl PropagationModel {
    fn flag(self) -> &'static str {
        match self {
            Self::Itwom => "1",
            Self::LongleyRice => "2",
            Self::Hata => "3",
            Self::Ecc33 => "4",
            Self::Sui => "5",
            Self::Cost231 => "6",
            Self::FreeSpace => "7",
            Self::Ericsson => "8",
            Self::Plog => "9",
            Self::Soil => "10",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Polarization {
    Vertical,
    Horizontal,
}

impl SignalServerConfig {
    /// Build the shell command that invokes `signal-server`, writing output
    /// alongside `output_file` under `executable_path`. Returns `None` if a
    /// required field fails basic validation (mirrors the original's
    /// boolean-returning `toCommand`).
    pub fn to_command(&self, executable_path: &Path) -> Option<String> {
        if self.sdf_directory.is_empty() || self.output_file.is_empty() {
            return None;
        }
        if self.radius_km <= 0.0 || self.resolution == 0 {
            return None;
        }

        let binary = executable_path.join("signalserver");
        let mut cmd = format!(
            "{} -sdf {} -lat {} -lon {} -txh {} -f {} -erp {} -pm {} -R {} -res {} -o {}",
            binary.display(),
            self.sdf_directory,
            self.latitude,
            self.longitude,
            self.tx_height_m,
            self.frequency_mhz,
            self.erp_watts,
            self.propagation_model.flag(),
            self.radius_km,
            self.resolution,
            self.output_file,
        );

        if let Some(h) = self.rx_height_m {
            cmd.push_str(&format!(" -rxh {h}"));
        }
        if let Some(g) = self.antenna_gain_dbi {
            cmd.push_str(&format!(" -gain {g}"));
        }
        if let Some(t) = self.signal_threshold_dbm {
            cmd.push_str(&format!(" -dbm {t}"));
        }
        if let Some(true) = self.knife_edge_diffraction {
            cmd.push_str(" -kst");
        }
        if let Some(true) = self.high_resolution {
            cmd.push_str(" -hd");
        }
        if let Some(true) = self.generate_kml {
            cmd.push_str(" -kml");
        }
        if let Some(true) = self.verbose {
            cmd.push_str(" -v");
        }

        Some(cmd)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal() -> SignalServerConfig {
        SignalServerConfig {
            sdf_directory: "/data/sdf".into(),
            output_file: "coverage".into(),
            latitude: 45.0,
            longitude: 9.0,
            tx_height_m: 10.0,
            frequency_mhz: 915.0,
            erp_watts: 1.0,
            propagation_model: PropagationModel::Itwom,
            radius_km: 5.0,
            resolution: 1200,
            rx_height_m: None,
            antenna_pattern_file: None,
            antenna_gain_dbi: None,
            polarization: None,
            clutter_file: None,
            terrain_multiplier: None,
            terrain_db_adjust: None,
            signal_threshold_dbm: None,
            color_file: None,
            ked_refractivity: None,
            earth_dielectric: None,
            earth_conductivity: None,
            climate_zone: None,
            knife_edge_diffraction: None,
            high_resolution: None,
            generate_kml: None,
            generate_geotiff: None,
            verbose: None,
        }
    }

    #[test]
    fn builds_required_flags_only() {
        let cfg = minimal();
        let cmd = cfg.to_command(Path::new("/opt/signal")).unwrap();
        assert!(cmd.starts_with("/opt/signal/signalserver"));
        assert!(cmd.contains("-lat 45"));
        assert!(cmd.contains("-pm 1"));
        assert!(!cmd.contains("-kst"));
    }

    #[test]
    fn rejects_empty_sdf_directory() {
        let mut cfg = minimal();
        cfg.sdf_directory.clear();
        assert!(cfg.to_command(Path::new("/opt/signal")).is_none());
    }
}
