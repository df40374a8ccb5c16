//! Fixed identities used on the mount control endpoint.

/// Path of the mount control WebSocket endpoint on the controller host
pub const ENDPOINT_PATH: &str = "/SmartScope-1.0/mountControlEndpoint";

/// Source identity stamped on every outbound command
pub const CLIENT_SOURCE: &str = "WebApp";

/// Destination of the heartbeat / verification query
pub const HEARTBEAT_DESTINATION: &str = destination::SYSTEM;

/// Command of the heartbeat / verification query
pub const HEARTBEAT_COMMAND: &str = "GetVersion";

/// Well-known command destinations on the controller
pub mod destination {
    /// System information and versioning
    pub const SYSTEM: &str = "System";
    /// On-board storage
    pub const DISK: &str = "Disk";
    /// Factory calibration state
    pub const FACTORY_CALIBRATION: &str = "FactoryCalibrationController";
    /// Mount motion and tracking
    pub const MOUNT: &str = "Mount";
    /// Imaging camera
    pub const CAMERA: &str = "Camera";
    /// Focuser
    pub const FOCUSER: &str = "Focuser";
    /// Ambient sensors and fans
    pub const ENVIRONMENT: &str = "Environment";
    /// Dew heater
    pub const DEW_HEATER: &str = "DewHeater";
    /// Orientation sensor
    pub const ORIENTATION_SENSOR: &str = "OrientationSensor";
    /// Task orchestration (captures, alignment)
    pub const TASK_CONTROLLER: &str = "TaskController";
    /// Image server, source of image notifications
    pub const IMAGE_SERVER: &str = "ImageServer";
}

/// Build the WebSocket URL of the mount control endpoint for `host`.
///
/// `host` may carry a port (`"192.168.1.10:8080"`).
pub fn endpoint_url(host: &str) -> String {
    format!("ws://{}{}", host.trim_end_matches('/'), ENDPOINT_PATH)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_url() {
        assert_eq!(
            endpoint_url("192.168.1.10"),
            "ws://192.168.1.10/SmartScope-1.0/mountControlEndpoint"
        );
        assert_eq!(
            endpoint_url("scope.local:8080/"),
            "ws://scope.local:8080/SmartScope-1.0/mountControlEndpoint"
        );
    }
}
