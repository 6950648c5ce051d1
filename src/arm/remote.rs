//! REST client for the remote arm service.
//!
//! A session is the lifetime of one operator token: `connect` evicts any
//! stale operator, registers, initializes the arm and returns the handle;
//! `disconnect` (or `end_session`) hands the token back.

use std::thread;
use std::time::Duration;

use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::LOCATION;
use serde::{Deserialize, Serialize};

use super::{ArmController, ArmError, Pose};
use crate::config::RobotConfig;

const AUTH_HEADER: &str = "Authentication";

#[derive(Debug, Serialize, Deserialize)]
struct Coordinate {
    x: f64,
    y: f64,
    z: f64,
}

#[derive(Debug, Serialize, Deserialize)]
struct Rotation {
    roll: f64,
    pitch: f64,
    yaw: f64,
}

#[derive(Debug, Serialize, Deserialize)]
struct TcpPose {
    coordinate: Coordinate,
    rotation: Rotation,
}

impl From<&Pose> for TcpPose {
    fn from(pose: &Pose) -> Self {
        Self {
            coordinate: Coordinate {
                x: pose.x,
                y: pose.y,
                z: pose.z,
            },
            rotation: Rotation {
                roll: pose.roll,
                pitch: pose.pitch,
                yaw: pose.yaw,
            },
        }
    }
}

impl From<TcpPose> for Pose {
    fn from(tcp: TcpPose) -> Self {
        Pose::new(
            tcp.coordinate.x,
            tcp.coordinate.y,
            tcp.coordinate.z,
            tcp.rotation.roll,
            tcp.rotation.pitch,
            tcp.rotation.yaw,
        )
    }
}

#[derive(Debug, Serialize)]
struct TargetRequest {
    target: TcpPose,
    speed: u32,
}

#[derive(Debug, Serialize)]
struct OperatorRequest<'a> {
    name: &'a str,
    email: &'a str,
}

#[derive(Debug, Deserialize)]
struct OperatorResponse {
    token: String,
}

/// Connected arm session.
pub struct RemoteArm {
    client: Client,
    /// `{base_url}/{bot_name}`
    endpoint: String,
    token: Option<String>,
    speed: u32,
    post_call_delay: Duration,
}

impl RemoteArm {
    /// Take over the arm: evict a stale operator, register, initialize.
    pub fn connect(config: &RobotConfig) -> Result<Self, ArmError> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .map_err(|source| ArmError::Http {
                operation: "build client",
                source,
            })?;

        let mut arm = Self {
            client,
            endpoint: format!(
                "{}/{}",
                config.base_url.trim_end_matches('/'),
                config.bot_name
            ),
            token: None,
            speed: config.speed,
            post_call_delay: Duration::from_millis(config.post_call_delay_ms),
        };

        if let Some(stale) = arm.current_operator()? {
            tracing::info!("evicting previous operator session");
            arm.delete_operator(&stale)?;
        }

        let token = arm.register(&config.operator_name, &config.operator_email)?;
        arm.token = Some(token);
        arm.initialize()?;

        tracing::info!(bot = %config.bot_name, "connected to arm");
        Ok(arm)
    }

    /// End the session and drop the handle.
    pub fn disconnect(mut self) -> Result<(), ArmError> {
        self.end_session()
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.endpoint, path)
    }

    fn token(&self) -> Result<&str, ArmError> {
        self.token.as_deref().ok_or(ArmError::SessionClosed)
    }

    /// Send, wait the fixed post-call delay, then check the status.
    fn call(&self, operation: &'static str, request: RequestBuilder) -> Result<Response, ArmError> {
        let result = request.send();
        thread::sleep(self.post_call_delay);

        let response = result.map_err(|source| ArmError::Http { operation, source })?;
        let status = response.status();
        tracing::debug!(operation, status = status.as_u16(), "arm call");

        if !status.is_success() {
            return Err(ArmError::Remote {
                operation,
                status: status.as_u16(),
            });
        }
        Ok(response)
    }

    fn current_operator(&self) -> Result<Option<String>, ArmError> {
        let operation = "get operator";
        let result = self.client.get(self.url("operator")).send();
        thread::sleep(self.post_call_delay);
        let response = result.map_err(|source| ArmError::Http { operation, source })?;

        // Anything but 200 means nobody holds the arm.
        if response.status().as_u16() != 200 {
            return Ok(None);
        }
        let body: OperatorResponse = response.json().map_err(|e| ArmError::Decode {
            operation,
            message: e.to_string(),
        })?;
        Ok(Some(body.token))
    }

    fn register(&self, name: &str, email: &str) -> Result<String, ArmError> {
        let request = self
            .client
            .post(self.url("operator"))
            .json(&OperatorRequest { name, email });
        let response = self.call("register operator", request)?;

        response
            .headers()
            .get(LOCATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|location| location.rsplit('/').next())
            .filter(|token| !token.is_empty())
            .map(str::to_string)
            .ok_or(ArmError::MissingToken)
    }

    fn delete_operator(&self, token: &str) -> Result<(), ArmError> {
        let request = self.client.delete(self.url(&format!("operator/{}", token)));
        self.call("delete operator", request)?;
        Ok(())
    }

    fn initialize(&self) -> Result<(), ArmError> {
        let request = self
            .client
            .put(self.url("initialize"))
            .header(AUTH_HEADER, self.token()?);
        self.call("initialize", request)?;
        Ok(())
    }
}

impl ArmController for RemoteArm {
    fn move_to(&mut self, pose: &Pose) -> Result<(), ArmError> {
        let body = TargetRequest {
            target: TcpPose::from(pose),
            speed: self.speed,
        };
        tracing::info!(%pose, speed = self.speed, "sending move");
        let request = self
            .client
            .put(self.url("tcp/target"))
            .header(AUTH_HEADER, self.token()?)
            .json(&body);
        self.call("move", request)?;
        Ok(())
    }

    fn tcp_pose(&mut self) -> Result<Pose, ArmError> {
        let operation = "read tcp";
        let request = self
            .client
            .get(self.url("tcp"))
            .header(AUTH_HEADER, self.token()?);
        let tcp: TcpPose = self
            .call(operation, request)?
            .json()
            .map_err(|e| ArmError::Decode {
                operation,
                message: e.to_string(),
            })?;
        Ok(tcp.into())
    }

    fn gripper(&mut self) -> Result<i64, ArmError> {
        let operation = "read gripper";
        let request = self
            .client
            .get(self.url("gripper"))
            .header(AUTH_HEADER, self.token()?);
        self.call(operation, request)?
            .json::<i64>()
            .map_err(|e| ArmError::Decode {
                operation,
                message: e.to_string(),
            })
    }

    fn set_gripper(&mut self, value: i64) -> Result<(), ArmError> {
        tracing::info!(value, "setting gripper");
        let request = self
            .client
            .put(self.url("gripper"))
            .header(AUTH_HEADER, self.token()?)
            .json(&value);
        self.call("set gripper", request)?;
        Ok(())
    }

    fn end_session(&mut self) -> Result<(), ArmError> {
        let token = self.token.take().ok_or(ArmError::SessionClosed)?;
        self.delete_operator(&token)?;
        tracing::info!("logged off");
        Ok(())
    }
}

impl Drop for RemoteArm {
    fn drop(&mut self) {
        if let Some(token) = self.token.take() {
            tracing::warn!("arm session dropped while connected, releasing token");
            if let Err(e) = self.delete_operator(&token) {
                tracing::error!("failed to release arm session: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_request_wire_format() {
        let body = TargetRequest {
            target: TcpPose::from(&Pose::new(10.0, -400.0, 300.0, 180.0, 0.0, 180.0)),
            speed: 200,
        };
        let json = serde_json::to_value(&body).unwrap();

        assert_eq!(json["speed"], 200);
        assert_eq!(json["target"]["coordinate"]["x"], 10.0);
        assert_eq!(json["target"]["coordinate"]["y"], -400.0);
        assert_eq!(json["target"]["rotation"]["roll"], 180.0);
        assert_eq!(json["target"]["rotation"]["yaw"], 180.0);
    }

    #[test]
    fn test_tcp_response_decodes_to_pose() {
        let tcp: TcpPose = serde_json::from_str(
            r#"{"coordinate":{"x":1.5,"y":-2.0,"z":300.0},"rotation":{"roll":180.0,"pitch":0.0,"yaw":90.0}}"#,
        )
        .unwrap();
        assert_eq!(Pose::from(tcp), Pose::new(1.5, -2.0, 300.0, 180.0, 0.0, 90.0));
    }
}
