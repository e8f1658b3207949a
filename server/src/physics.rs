//! Court simulation: paddle and ball integration, collisions, scoring.
//!
//! Everything here is a plain function of the court state, the inputs, `dt`
//! and a caller-supplied rng, so a seeded rng makes a match reproducible.

use pong_shared::config::GameConfig;
use rand::Rng;

/// Which end of the court a paddle defends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    /// Paddle 1
    Left,
    /// Paddle 2
    Right,
}

impl Side {
    /// Paddle role as seen on the wire (1 = left, 2 = right).
    pub fn role(self) -> u8 {
        match self {
            Side::Left => 1,
            Side::Right => 2,
        }
    }

    pub fn opponent(self) -> Side {
        match self {
            Side::Left => Side::Right,
            Side::Right => Side::Left,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ball {
    pub x: f64,
    pub y: f64,
    pub dx: f64,
    pub dy: f64,
    pub radius: f64,
    /// Serve speed
    pub speed: f64,
    /// Seconds left before a served ball starts moving
    pub serve_timer: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Paddle {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub speed: f64,
    pub score: u32,
}

/// Held-key state for one paddle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PaddleInput {
    pub up: bool,
    pub down: bool,
}

/// What happened during one `advance`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StepOutcome {
    /// Paddle that returned the ball
    pub hit: Option<Side>,
    /// Side that won the point
    pub scored: Option<Side>,
    /// Set when the point ended the match
    pub winner: Option<Side>,
}

/// Simulation state of one room.
#[derive(Debug, Clone)]
pub struct Court {
    pub width: f64,
    pub height: f64,
    pub ball: Ball,
    pub paddle1: Paddle,
    pub paddle2: Paddle,
    tuning: GameConfig,
}

impl Court {
    pub fn new(config: &GameConfig) -> Self {
        let paddle = |x: f64| Paddle {
            x,
            y: (config.court_height - config.paddle_height) / 2.0,
            width: config.paddle_width,
            height: config.paddle_height,
            speed: config.paddle_speed,
            score: 0,
        };
        Self {
            width: config.court_width,
            height: config.court_height,
            ball: Ball {
                x: config.court_width / 2.0,
                y: config.court_height / 2.0,
                dx: config.initial_dx,
                dy: config.initial_dy,
                radius: config.ball_radius,
                speed: config.ball_speed,
                serve_timer: 0.0,
            },
            paddle1: paddle(config.paddle_inset),
            paddle2: paddle(config.right_paddle_x()),
            tuning: *config,
        }
    }

    pub fn tuning(&self) -> &GameConfig {
        &self.tuning
    }

    pub fn paddle(&self, side: Side) -> &Paddle {
        match side {
            Side::Left => &self.paddle1,
            Side::Right => &self.paddle2,
        }
    }

    pub fn paddle_mut(&mut self, side: Side) -> &mut Paddle {
        match side {
            Side::Left => &mut self.paddle1,
            Side::Right => &mut self.paddle2,
        }
    }

    /// Scores of (paddle1, paddle2).
    pub fn scores(&self) -> (u32, u32) {
        (self.paddle1.score, self.paddle2.score)
    }

    /// Back to the opening layout: scores cleared, paddles centered, ball at
    /// rest in the middle.
    pub fn reset(&mut self) {
        *self = Court::new(&self.tuning);
        self.park_ball();
    }

    fn park_ball(&mut self) {
        self.ball.x = self.width / 2.0;
        self.ball.y = self.height / 2.0;
        self.ball.dx = 0.0;
        self.ball.dy = 0.0;
        self.ball.serve_timer = 0.0;
    }
}

/// Serve from center toward `toward`, with a random shallow angle.
pub fn serve(court: &mut Court, toward: Side, rng: &mut impl Rng) {
    let max_angle = court.tuning.serve_angle;
    let angle = if max_angle > 0.0 {
        rng.gen_range(-max_angle..=max_angle)
    } else {
        0.0
    };
    let direction = match toward {
        Side::Left => -1.0,
        Side::Right => 1.0,
    };
    let ball = &mut court.ball;
    ball.x = court.width / 2.0;
    ball.y = court.height / 2.0;
    ball.dx = direction * ball.speed;
    ball.dy = angle * ball.speed;
    ball.serve_timer = court.tuning.serve_delay;
}

/// Opening serve of a match: random side.
pub fn serve_random(court: &mut Court, rng: &mut impl Rng) {
    let toward = if rng.gen_bool(0.5) {
        Side::Left
    } else {
        Side::Right
    };
    serve(court, toward, rng);
}

/// Advance the court by `dt` seconds.
///
/// `inputs` carries the held keys of every seated player. Callers cap `dt`
/// so a scheduling hiccup can't fling the ball across the court.
pub fn advance(
    court: &mut Court,
    inputs: impl IntoIterator<Item = (Side, PaddleInput)>,
    dt: f64,
    rng: &mut impl Rng,
) -> StepOutcome {
    let mut outcome = StepOutcome::default();
    let dt = dt.max(0.0);
    let height = court.height;

    for (side, input) in inputs {
        move_paddle(court.paddle_mut(side), input, height, dt);
    }

    if court.ball.serve_timer > 0.0 {
        court.ball.serve_timer = (court.ball.serve_timer - dt).max(0.0);
        return outcome;
    }

    let (prev_x, prev_y) = (court.ball.x, court.ball.y);
    court.ball.x += court.ball.dx * dt;
    court.ball.y += court.ball.dy * dt;

    bounce_off_walls(&mut court.ball, height);

    for side in [Side::Left, Side::Right] {
        if collide_with_paddle(court, side, prev_x, prev_y) {
            outcome.hit = Some(side);
        }
    }

    let ball = court.ball;
    let scorer = if ball.x < -ball.radius {
        Some(Side::Right)
    } else if ball.x > court.width + ball.radius {
        Some(Side::Left)
    } else {
        None
    };

    if let Some(scorer) = scorer {
        outcome.scored = Some(scorer);
        let max_score = court.tuning.max_score;
        let paddle = court.paddle_mut(scorer);
        paddle.score += 1;
        if paddle.score >= max_score {
            outcome.winner = Some(scorer);
            court.park_ball();
        } else {
            serve(court, scorer.opponent(), rng);
        }
    }

    outcome
}

fn move_paddle(paddle: &mut Paddle, input: PaddleInput, court_height: f64, dt: f64) {
    if input.up {
        paddle.y = (paddle.y - paddle.speed * dt).max(0.0);
    } else if input.down {
        paddle.y = (paddle.y + paddle.speed * dt).min(court_height - paddle.height);
    }
}

fn bounce_off_walls(ball: &mut Ball, court_height: f64) {
    if ball.y - ball.radius <= 0.0 {
        ball.y = ball.radius;
        ball.dy = ball.dy.abs();
    } else if ball.y + ball.radius >= court_height {
        ball.y = court_height - ball.radius;
        ball.dy = -ball.dy.abs();
    }
}

/// Swept test of the ball's leading edge against the paddle face between the
/// previous and current position, so fast volleys can't skip past a paddle
/// in a single step.
fn collide_with_paddle(court: &mut Court, side: Side, prev_x: f64, prev_y: f64) -> bool {
    let paddle = *court.paddle(side);
    let restitution = court.tuning.restitution;
    let spin = court.tuning.spin;
    let ball = &mut court.ball;
    let r = ball.radius;

    let (approaching, face, prev_edge, cur_edge, in_front) = match side {
        Side::Left => (
            ball.dx < 0.0,
            paddle.x + paddle.width,
            prev_x - r,
            ball.x - r,
            ball.x > paddle.x,
        ),
        Side::Right => (
            ball.dx > 0.0,
            paddle.x,
            prev_x + r,
            ball.x + r,
            ball.x < paddle.x + paddle.width,
        ),
    };
    if !approaching {
        return false;
    }

    let (was_clear, now_touching) = match side {
        Side::Left => (prev_edge >= face, cur_edge <= face),
        Side::Right => (prev_edge <= face, cur_edge >= face),
    };
    if !now_touching {
        return false;
    }

    let impact_y = if was_clear {
        let travel = (prev_edge - cur_edge).abs();
        let t = if travel > f64::EPSILON {
            (prev_edge - face).abs() / travel
        } else {
            0.0
        };
        prev_y + (ball.y - prev_y) * t
    } else if in_front {
        ball.y
    } else {
        return false;
    };

    if impact_y + r < paddle.y || impact_y - r > paddle.y + paddle.height {
        return false;
    }

    let hit_pos = ((impact_y - paddle.y) / paddle.height - 0.5) * 2.0;
    match side {
        Side::Left => {
            ball.x = face + r;
            ball.dx = ball.dx.abs() * restitution;
        }
        Side::Right => {
            ball.x = face - r;
            ball.dx = -ball.dx.abs() * restitution;
        }
    }
    ball.y = impact_y.clamp(r, court.height - r);
    ball.dy += hit_pos.clamp(-1.0, 1.0) * spin;
    true
}
