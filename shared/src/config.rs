/// Court geometry and match tuning.
///
/// Sent to clients on connect so they can render the court at the same
/// scale the server simulates it.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize, ts_rs::TS)]
#[ts(export, export_to = "../../web/src/generated/")]
pub struct GameConfig {
    pub court_width: f64,
    pub court_height: f64,
    pub ball_radius: f64,
    /// Serve speed along x (units/s)
    pub ball_speed: f64,
    /// Velocity of the very first ball before any serve
    pub initial_dx: f64,
    pub initial_dy: f64,
    pub paddle_width: f64,
    pub paddle_height: f64,
    /// Paddle travel speed (units/s)
    pub paddle_speed: f64,
    /// Distance from the left wall to the left paddle's back edge
    pub paddle_inset: f64,
    pub max_score: u32,
    /// Multiplier applied to |dx| on every paddle return
    pub restitution: f64,
    /// Vertical velocity added for an edge hit
    pub spin: f64,
    /// Max |dy / speed| of a serve
    pub serve_angle: f64,
    /// Seconds the ball rests at center after a point
    pub serve_delay: f64,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            court_width: 800.0,
            court_height: 600.0,
            ball_radius: 10.0,
            ball_speed: 300.0,
            initial_dx: 300.0,
            initial_dy: 200.0,
            paddle_width: 20.0,
            paddle_height: 100.0,
            paddle_speed: 400.0,
            paddle_inset: 30.0,
            max_score: 10,
            restitution: 1.05,
            spin: 100.0,
            serve_angle: 0.25,
            serve_delay: 0.5,
        }
    }
}

impl GameConfig {
    /// Right paddle sits as far from the right wall as the left paddle's
    /// front face is from the left wall.
    pub fn right_paddle_x(&self) -> f64 {
        self.court_width - self.paddle_inset - self.paddle_width
    }

    pub fn validate(&self) -> Result<(), String> {
        if !self.court_width.is_finite() || self.court_width <= 0.0 {
            return Err("court_width must be finite and > 0".to_string());
        }
        if !self.court_height.is_finite() || self.court_height <= 0.0 {
            return Err("court_height must be finite and > 0".to_string());
        }
        if !self.ball_radius.is_finite() || self.ball_radius <= 0.0 {
            return Err("ball_radius must be finite and > 0".to_string());
        }
        if self.ball_radius * 2.0 >= self.court_height {
            return Err("ball must fit between the walls".to_string());
        }
        if !self.ball_speed.is_finite() || self.ball_speed <= 0.0 {
            return Err("ball_speed must be finite and > 0".to_string());
        }
        if !self.paddle_height.is_finite()
            || self.paddle_height <= 0.0
            || self.paddle_height > self.court_height
        {
            return Err("paddle_height must be in (0, court_height]".to_string());
        }
        if !self.paddle_width.is_finite() || self.paddle_width <= 0.0 {
            return Err("paddle_width must be finite and > 0".to_string());
        }
        if self.paddle_inset < 0.0 || self.right_paddle_x() <= self.court_width / 2.0 {
            return Err("paddles must sit on opposite halves of the court".to_string());
        }
        if !self.paddle_speed.is_finite() || self.paddle_speed < 0.0 {
            return Err("paddle_speed must be finite and >= 0".to_string());
        }
        if self.max_score == 0 {
            return Err("max_score must be >= 1".to_string());
        }
        if !self.restitution.is_finite() || self.restitution < 1.0 {
            return Err("restitution must be finite and >= 1".to_string());
        }
        if !self.serve_angle.is_finite() || self.serve_angle < 0.0 {
            return Err("serve_angle must be finite and >= 0".to_string());
        }
        if !self.serve_delay.is_finite() || self.serve_delay < 0.0 {
            return Err("serve_delay must be finite and >= 0".to_string());
        }
        Ok(())
    }
}
