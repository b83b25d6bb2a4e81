// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Built-in geometry toolkit operations exposed by the worker
//!
//! Points travel as `[[x, y, z], ...]` and matrices as row-major `4x4`
//! nested lists.

use super::registry::{CallArgs, OperationError, Registry};
use crate::protocol::encode;
use nalgebra::{Matrix4, Point3, Vector3};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub type Points = Vec<[f64; 3]>;

/// Scale factor: uniform or per axis
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(untagged)]
enum Scale {
    Uniform(f64),
    Axes([f64; 3]),
}

pub(crate) fn register_builtins(registry: &mut Registry) {
    registry
        .register("geometry.transform_points", transform_points)
        .register("geometry.translate_points", translate_points)
        .register("geometry.scale_points", scale_points)
        .register("geometry.translation_matrix", translation_matrix)
        .register("geometry.centroid_points", centroid_points)
        .register("geometry.bounding_box", bounding_box)
        .register("worker.ping", |_| Ok(Value::from(GREETING)));
}

pub const GREETING: &str = "Hello, this is a geocloud worker.";

fn to_value<T: Serialize>(value: T) -> Result<Value, OperationError> {
    encode::to_value(&value).map_err(|e| OperationError::Unencodable(e.to_string()))
}

/// Parse a row-major 4x4 matrix
pub fn matrix_from_rows(rows: &[Vec<f64>]) -> Result<Matrix4<f64>, OperationError> {
    if rows.len() != 4 || rows.iter().any(|row| row.len() != 4) {
        return Err(OperationError::invalid("matrix", "matrix must be 4x4"));
    }
    let flat: Vec<f64> = rows.iter().flatten().copied().collect();
    Ok(Matrix4::from_row_slice(&flat))
}

pub fn matrix_to_rows(matrix: &Matrix4<f64>) -> Vec<[f64; 4]> {
    (0..4)
        .map(|r| [matrix[(r, 0)], matrix[(r, 1)], matrix[(r, 2)], matrix[(r, 3)]])
        .collect()
}

/// Apply a homogeneous transform to every point
pub fn apply_matrix(points: &[[f64; 3]], matrix: &Matrix4<f64>) -> Points {
    points
        .iter()
        .map(|p| {
            let q = matrix.transform_point(&Point3::new(p[0], p[1], p[2]));
            [q.x, q.y, q.z]
        })
        .collect()
}

fn transform_points(args: &CallArgs) -> Result<Value, OperationError> {
    let points: Points = args.arg(0, "points")?;
    let rows: Vec<Vec<f64>> = args.arg(1, "matrix")?;
    let matrix = matrix_from_rows(&rows)?;
    to_value(apply_matrix(&points, &matrix))
}

fn translate_points(args: &CallArgs) -> Result<Value, OperationError> {
    let points: Points = args.arg(0, "points")?;
    let v: [f64; 3] = args.arg(1, "vector")?;
    let offset = Vector3::new(v[0], v[1], v[2]);

    let moved: Points = points
        .iter()
        .map(|p| {
            let q = Point3::new(p[0], p[1], p[2]) + offset;
            [q.x, q.y, q.z]
        })
        .collect();
    to_value(moved)
}

fn scale_points(args: &CallArgs) -> Result<Value, OperationError> {
    let points: Points = args.arg(0, "points")?;
    let factors = match args.arg::<Scale>(1, "factor")? {
        Scale::Uniform(s) => Vector3::new(s, s, s),
        Scale::Axes(a) => Vector3::new(a[0], a[1], a[2]),
    };
    let matrix = Matrix4::new_nonuniform_scaling(&factors);
    to_value(apply_matrix(&points, &matrix))
}

fn translation_matrix(args: &CallArgs) -> Result<Value, OperationError> {
    let v: [f64; 3] = args.arg(0, "vector")?;
    let matrix = Matrix4::new_translation(&Vector3::new(v[0], v[1], v[2]));
    to_value(matrix_to_rows(&matrix))
}

fn centroid_points(args: &CallArgs) -> Result<Value, OperationError> {
    let points: Points = args.arg(0, "points")?;
    if points.is_empty() {
        return Err(OperationError::invalid("points", "no points given"));
    }

    let sum = points
        .iter()
        .fold(Vector3::zeros(), |acc, p| acc + Vector3::new(p[0], p[1], p[2]));
    let c = sum / points.len() as f64;
    to_value([c.x, c.y, c.z])
}

/// Eight corners: bottom face counter-clockwise, then top face
///
/// An optional `padding` grows the box by that distance on every side.
fn bounding_box(args: &CallArgs) -> Result<Value, OperationError> {
    let points: Points = args.arg(0, "points")?;
    if points.is_empty() {
        return Err(OperationError::invalid("points", "no points given"));
    }
    let padding: f64 = args.opt(1, "padding")?.unwrap_or(0.0);
    if padding < 0.0 {
        return Err(OperationError::invalid("padding", "must not be negative"));
    }

    let mut min = Vector3::repeat(f64::INFINITY);
    let mut max = Vector3::repeat(f64::NEG_INFINITY);
    for p in &points {
        let v = Vector3::new(p[0], p[1], p[2]);
        min = min.inf(&v);
        max = max.sup(&v);
    }
    min.add_scalar_mut(-padding);
    max.add_scalar_mut(padding);

    let corners: Points = vec![
        [min.x, min.y, min.z],
        [max.x, min.y, min.z],
        [max.x, max.y, min.z],
        [min.x, max.y, min.z],
        [min.x, min.y, max.z],
        [max.x, min.y, max.z],
        [max.x, max.y, max.z],
        [min.x, max.y, max.z],
    ];
    to_value(corners)
}
