//! Third-Person Character Controller
//!
//! Turns one frame of input plus the camera orientation into velocity and
//! integrates the character's transform for a single command frame.
//!
//! Velocity is the sum of three parts:
//! - base velocity: gravity and jumps
//! - controller velocity: ramped WASD movement relative to the camera
//! - zip velocity: a burst along camera-forward that decays on release

use glam::{Quat, Vec3};

use crate::config::SimulationConfig;
use crate::core::math::{flat_direction, forward, look_rotation_y, right};
use crate::game::components::{AnimationComponent, ThirdPersonControllerComponent, TransformComponent};
use crate::game::input::FrameInput;

/// Advance one character by one command frame.
///
/// `grounded` is read but only cleared here (by a jump); setting it is the
/// collision resolver's job.
pub fn update_controller(
    delta: f32,
    controller: &mut ThirdPersonControllerComponent,
    transform: &mut TransformComponent,
    camera_orientation: Quat,
    input: &FrameInput,
    config: &SimulationConfig,
) {
    let control = input.control_vector();

    // Jump fires once per landing
    if control.y > 0.0 && controller.grounded {
        controller.base_velocity.y += config.jump_speed;
        controller.grounded = false;
    }

    update_zip(controller, camera_orientation, input.zip_held(), config);

    let direction = movement_direction(camera_orientation, control);
    controller.movement_speed = if direction == Vec3::ZERO {
        0.0
    } else {
        ramp_movement_speed(controller.movement_speed, config)
    };
    controller.controller_velocity = direction * controller.movement_speed;

    controller.base_velocity.y -= config.gravity * delta;
    controller.velocity = controller.base_velocity + controller.controller_velocity + controller.zip_velocity;
    transform.position += controller.velocity * delta;

    if transform.position.y < config.world_floor_y {
        transform.position.y = config.respawn_height;
        controller.base_velocity = Vec3::ZERO;
    }

    if let Some(rotation) = look_rotation_y(controller.controller_velocity) {
        transform.orientation = rotation;
    }
}

/// Horizontal movement direction from the control vector, relative to the
/// camera. Zero when no horizontal keys are held or they cancel out.
pub fn movement_direction(camera_orientation: Quat, control: Vec3) -> Vec3 {
    let cam_forward = flat_direction(forward(camera_orientation));
    let cam_right = flat_direction(right(camera_orientation));
    let direction = cam_forward * control.z + cam_right * control.x;
    direction.normalize_or_zero()
}

/// Next movement speed: fast ramp below the soft cap, slow ramp up to the
/// max, flat at the max.
pub fn ramp_movement_speed(speed: f32, config: &SimulationConfig) -> f32 {
    let next = if speed < config.movement_soft_cap {
        speed + config.movement_ramp_fast
    } else if speed < config.movement_max_speed {
        speed + config.movement_ramp_slow
    } else {
        speed
    };
    next.min(config.movement_max_speed)
}

/// Grow the zip toward `zip_speed` while held, decay it once released.
fn update_zip(
    controller: &mut ThirdPersonControllerComponent,
    camera_orientation: Quat,
    held: bool,
    config: &SimulationConfig,
) {
    let zip = controller.zip_velocity;

    if held {
        controller.zip_velocity = if zip == Vec3::ZERO {
            forward(camera_orientation).normalize_or_zero() * config.zip_acceleration
        } else {
            let speed = (zip.length() + config.zip_acceleration).min(config.zip_speed);
            zip.normalize_or_zero() * speed
        };
    } else if zip != Vec3::ZERO {
        let decayed = zip * config.zip_decay;
        controller.zip_velocity = if decayed.length() < config.zip_epsilon {
            Vec3::ZERO
        } else {
            decayed
        };
    }
}

/// Animation clip for the controller's current state.
pub fn animation_for(controller: &ThirdPersonControllerComponent) -> &'static str {
    if !controller.grounded {
        AnimationComponent::AIRBORNE
    } else if controller.controller_velocity != Vec3::ZERO {
        AnimationComponent::RUN
    } else {
        AnimationComponent::IDLE
    }
}
