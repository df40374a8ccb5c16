//! Typed wrappers for the controller's known commands.
//!
//! Each wrapper sends one destination/command pair with the default command
//! timeout. Frequently polled status queries log quietly.

use crate::client::OriginClient;
use origin_wire::{destination, Message, Payload};
use serde_json::Value;

fn payload<const N: usize>(fields: [(&str, Value); N]) -> Payload {
    fields
        .into_iter()
        .map(|(key, value)| (key.to_string(), value))
        .collect()
}

impl OriginClient {
    async fn query(&self, destination: &str, command: &str, verbose: bool) -> Option<Message> {
        self.send_command(
            destination,
            command,
            Payload::new(),
            self.config().command_timeout,
            verbose,
        )
        .await
    }

    /// `System/GetVersion`
    pub async fn get_system_version(&self) -> Option<Message> {
        self.query(destination::SYSTEM, "GetVersion", false).await
    }

    /// `System/GetModel`
    pub async fn get_system_model(&self) -> Option<Message> {
        self.query(destination::SYSTEM, "GetModel", true).await
    }

    /// `Disk/GetStatus`
    pub async fn get_disk_status(&self) -> Option<Message> {
        self.query(destination::DISK, "GetStatus", true).await
    }

    /// `FactoryCalibrationController/GetStatus`
    pub async fn get_factory_calibration_status(&self) -> Option<Message> {
        self.query(destination::FACTORY_CALIBRATION, "GetStatus", false)
            .await
    }

    /// `Mount/GetStatus`
    pub async fn get_mount_status(&self) -> Option<Message> {
        self.query(destination::MOUNT, "GetStatus", false).await
    }

    /// `Camera/GetCameraInfo`
    pub async fn get_camera_info(&self) -> Option<Message> {
        self.query(destination::CAMERA, "GetCameraInfo", true).await
    }

    /// `Camera/GetFilter`
    pub async fn get_camera_filter(&self) -> Option<Message> {
        self.query(destination::CAMERA, "GetFilter", true).await
    }

    /// `Focuser/GetStatus`
    pub async fn get_focuser_status(&self) -> Option<Message> {
        self.query(destination::FOCUSER, "GetStatus", false).await
    }

    /// `Environment/GetStatus`
    pub async fn get_environment_status(&self) -> Option<Message> {
        self.query(destination::ENVIRONMENT, "GetStatus", false).await
    }

    /// `Environment/GetFans`
    pub async fn get_environment_fans(&self) -> Option<Message> {
        self.query(destination::ENVIRONMENT, "GetFans", true).await
    }

    /// `DewHeater/GetStatus`
    pub async fn get_dew_heater_status(&self) -> Option<Message> {
        self.query(destination::DEW_HEATER, "GetStatus", true).await
    }

    /// `OrientationSensor/GetStatus`
    pub async fn get_orientation_sensor_status(&self) -> Option<Message> {
        self.query(destination::ORIENTATION_SENSOR, "GetStatus", false)
            .await
    }

    /// Slew to an altitude/azimuth, both in radians
    pub async fn goto_alt_azm(&self, alt_rad: f64, azm_rad: f64) -> Option<Message> {
        self.command(
            destination::MOUNT,
            "GotoAltAzm",
            payload([("Alt", alt_rad.into()), ("Azm", azm_rad.into())]),
        )
        .await
    }

    /// Turn sidereal tracking on or off
    pub async fn enable_tracking(&self, enabled: bool) -> Option<Message> {
        self.command(
            destination::MOUNT,
            "EnableTracking",
            payload([("Value", enabled.into())]),
        )
        .await
    }

    /// Set exposure (seconds), ISO, binning, and bit depth for captures
    pub async fn set_camera_parameters(
        &self,
        exposure_sec: f64,
        iso: u32,
        binning: u32,
        bit_depth: u32,
    ) -> Option<Message> {
        self.command(
            destination::CAMERA,
            "SetCaptureParameters",
            payload([
                ("Exposure", exposure_sec.into()),
                ("ISO", iso.into()),
                ("Binning", binning.into()),
                ("BitDepth", bit_depth.into()),
            ]),
        )
        .await
    }

    /// Take a single sample capture; the image is announced by a
    /// `NewImageReady` notification
    pub async fn run_sample_capture(
        &self,
        exposure_sec: f64,
        iso: u32,
        binning: u32,
    ) -> Option<Message> {
        self.command(
            destination::TASK_CONTROLLER,
            "RunSampleCapture",
            payload([
                ("ExposureTime", exposure_sec.into()),
                ("ISO", iso.into()),
                ("Binning", binning.into()),
            ]),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use crate::testing::{fast_config, MockController};
    use crate::OriginClient;
    use serde_json::json;

    #[tokio::test]
    async fn test_typed_wrappers_frame_commands() {
        let mock = MockController::start().await;
        let client = OriginClient::new(fast_config(&mock.url));
        assert!(client.connect().await);

        assert!(client.get_mount_status().await.unwrap().is_success());
        assert!(client.get_system_model().await.unwrap().is_success());
        client.goto_alt_azm(0.5, 1.25).await.unwrap();
        client.enable_tracking(false).await.unwrap();
        client.set_camera_parameters(2.5, 800, 1, 16).await.unwrap();
        client.run_sample_capture(1.0, 1600, 2).await.unwrap();

        let received = mock.received();
        let find = |command: &str| {
            received
                .iter()
                .find(|m| m.command == command)
                .cloned()
                .unwrap()
        };

        let status = find("GetStatus");
        assert_eq!(status.destination, "Mount");
        assert!(status.payload.is_empty());

        let goto = find("GotoAltAzm");
        assert_eq!(goto.destination, "Mount");
        assert_eq!(goto.field("Alt"), Some(&json!(0.5)));
        assert_eq!(goto.field("Azm"), Some(&json!(1.25)));

        assert_eq!(find("EnableTracking").field("Value"), Some(&json!(false)));

        let params = find("SetCaptureParameters");
        assert_eq!(params.destination, "Camera");
        assert_eq!(params.field("ISO"), Some(&json!(800)));
        assert_eq!(params.field("BitDepth"), Some(&json!(16)));

        let capture = find("RunSampleCapture");
        assert_eq!(capture.destination, "TaskController");
        assert_eq!(capture.field("ExposureTime"), Some(&json!(1.0)));
        assert_eq!(capture.field("Binning"), Some(&json!(2)));

        client.close().await;
    }
}
