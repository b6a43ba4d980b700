use bevy::math::IVec2;

/// Twice the signed area of the triangle (a, b, c).
///
/// Contours produced by the edge walk are wound so that interior triples
/// yield a negative value; [left] & friends encode that convention.
#[inline]
pub(super) fn area2(a: IVec2, b: IVec2, c: IVec2) -> i64 {
    let ab = (b - a).as_i64vec2();
    let ac = (c - a).as_i64vec2();

    ab.x * ac.y - ac.x * ab.y
}

#[inline]
pub(super) fn left(a: IVec2, b: IVec2, c: IVec2) -> bool {
    area2(a, b, c) < 0
}

#[inline]
pub(super) fn left_on(a: IVec2, b: IVec2, c: IVec2) -> bool {
    area2(a, b, c) <= 0
}

#[inline]
pub(super) fn collinear(a: IVec2, b: IVec2, c: IVec2) -> bool {
    area2(a, b, c) == 0
}

/// True when (a, b) & (c, d) intersect properly: they cross at a point
/// interior to both segments.
pub(super) fn intersect_prop(a: IVec2, b: IVec2, c: IVec2, d: IVec2) -> bool {
    if collinear(a, b, c) || collinear(a, b, d) || collinear(c, d, a) || collinear(c, d, b) {
        return false;
    }

    (left(a, b, c) ^ left(a, b, d)) && (left(c, d, a) ^ left(c, d, b))
}

/// True when c lies on the closed segment (a, b).
pub(super) fn between(a: IVec2, b: IVec2, c: IVec2) -> bool {
    if !collinear(a, b, c) {
        return false;
    }

    if a.x != b.x {
        (a.x <= c.x && c.x <= b.x) || (a.x >= c.x && c.x >= b.x)
    } else {
        (a.y <= c.y && c.y <= b.y) || (a.y >= c.y && c.y >= b.y)
    }
}

/// True when (a, b) & (c, d) intersect, properly or not.
pub(super) fn intersect(a: IVec2, b: IVec2, c: IVec2, d: IVec2) -> bool {
    intersect_prop(a, b, c, d)
        || between(a, b, c)
        || between(a, b, d)
        || between(c, d, a)
        || between(c, d, b)
}

/// Squared distance from ``point`` to the closed segment (seg_a, seg_b).
pub(super) fn point_distance_from_segment(point: IVec2, seg_a: IVec2, seg_b: IVec2) -> f32 {
    let segment_delta = (seg_b - seg_a).as_vec2();
    let point_delta = (point - seg_a).as_vec2();

    let d = segment_delta.x * segment_delta.x + segment_delta.y * segment_delta.y;
    let mut t = segment_delta.x * point_delta.x + segment_delta.y * point_delta.y;
    if d > 0.0 {
        t /= d;
    }
    t = t.clamp(0.0, 1.0);

    let delta_x = seg_a.x as f32 + t * segment_delta.x - point.x as f32;
    let delta_y = seg_a.y as f32 + t * segment_delta.y - point.y as f32;

    delta_x * delta_x + delta_y * delta_y
}
