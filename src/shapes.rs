//! Shape library: name resolution and density-grid generation.
//!
//! Every shape is a function that fills a `grid_w x grid_h` array of
//! floats in [0, 1] representing a spatial density field. The sampler
//! draws atom target positions from this density, so denser regions
//! attract more atoms. All generators end with a mild separable Gaussian
//! blur so hard masks spread into a natural cloud instead of piling every
//! atom on a boundary pixel.
//!
//! Grid convention: row 0 is the bottom of the screen (NDC y = -1),
//! column 0 the left edge (NDC x = -1).
//!
//! Adding a shape: write a generator, register it in `CANONICAL` and the
//! `build` dispatch, and optionally add aliases.

use std::collections::HashMap;

/// Canonical shape names, in registry order. Three tiers: geometric
/// primitives, mathematical curves/attractors/fractals, molecular/lattice.
pub const CANONICAL: &[&str] = &[
    // geometric
    "circle",
    "ring",
    "square",
    "cross",
    "diamond",
    "heart",
    "star5",
    "star6",
    // mathematical
    "spiral",
    "lissajous",
    "rose",
    "clifford",
    "dejong",
    "sierpinski",
    // molecular / lattice
    "dna",
    "benzene",
    "graphene",
    "snowflake",
];

/// Alias table. Each alias maps one non-canonical word to exactly one
/// canonical name; there are no alias-to-alias chains.
const ALIASES: &[(&str, &str)] = &[
    ("disc", "circle"),
    ("dot", "circle"),
    ("donut", "ring"),
    ("annulus", "ring"),
    ("box", "square"),
    ("plus", "cross"),
    ("gem", "diamond"),
    ("love", "heart"),
    ("star", "star5"),
    ("pentagram", "star5"),
    ("hexagram", "star6"),
    ("galaxy", "spiral"),
    ("swirl", "spiral"),
    ("flower", "rose"),
    ("attractor", "clifford"),
    ("triangle", "sierpinski"),
    ("helix", "dna"),
    ("molecule", "benzene"),
    ("lattice", "graphene"),
    ("koch", "snowflake"),
];

/// The name every unresolvable input falls back to.
pub const DEFAULT_SHAPE: &str = "circle";

/// Resolve free-form user text to a canonical shape name.
///
/// Order: trim + lowercase, exact canonical match, alias match, longest
/// prefix match against the canonical set, then the fixed default. The
/// result is always a member of `CANONICAL`, so `resolve(resolve(x)) ==
/// resolve(x)` holds for any input.
pub fn resolve(text: &str) -> &'static str {
    let q = text.trim().to_lowercase();
    if q.is_empty() {
        return DEFAULT_SHAPE;
    }
    if let Some(&c) = CANONICAL.iter().find(|&&c| c == q) {
        return c;
    }
    if let Some(&(_, c)) = ALIASES.iter().find(|&&(a, _)| a == q) {
        // Aliases point into the canonical set; return the static name.
        return CANONICAL.iter().find(|&&n| n == c).copied().unwrap_or(DEFAULT_SHAPE);
    }
    // Longest prefix match: accept a candidate when one string is a prefix
    // of the other; ties keep registry order.
    let mut best: Option<(&'static str, usize)> = None;
    for &c in CANONICAL {
        let l = common_prefix_len(&q, c);
        if l > 0 && (l == q.len() || l == c.len()) && best.map_or(true, |(_, bl)| l > bl) {
            best = Some((c, l));
        }
    }
    best.map(|(c, _)| c).unwrap_or(DEFAULT_SHAPE)
}

fn common_prefix_len(a: &str, b: &str) -> usize {
    a.bytes().zip(b.bytes()).take_while(|(x, y)| x == y).count()
}

/// Cached density-grid generator.
///
/// Grids are generated once per canonical name and kept for the process
/// lifetime; the library never invalidates.
pub struct ShapeLibrary {
    grid_w: usize,
    grid_h: usize,
    cache: HashMap<&'static str, Vec<f32>>,
}

impl ShapeLibrary {
    pub fn new(grid_w: u32, grid_h: u32) -> Self {
        Self {
            grid_w: grid_w as usize,
            grid_h: grid_h as usize,
            cache: HashMap::new(),
        }
    }

    /// Return the density grid for a canonical name, generating on first use.
    pub fn generate(&mut self, canonical: &'static str) -> &[f32] {
        let (w, h) = (self.grid_w, self.grid_h);
        self.cache.entry(canonical).or_insert_with(|| build(canonical, w, h))
    }
}

/// Dispatch a canonical name to its generator and post-process the result.
fn build(name: &str, w: usize, h: usize) -> Vec<f32> {
    let mut canvas = Canvas::new(w, h);
    match name {
        "circle" => canvas.fill_mask(|x, y| x * x + y * y < 0.72 * 0.72),
        "ring" => canvas.fill_mask(|x, y| {
            let d = (x * x + y * y).sqrt();
            d > 0.60 && d < 0.76
        }),
        "square" => canvas.fill_mask(|x, y| x.abs().max(y.abs()) < 0.62),
        "cross" => canvas.fill_mask(|x, y| {
            (x.abs() < 0.20 && y.abs() < 0.72) || (y.abs() < 0.20 && x.abs() < 0.72)
        }),
        "diamond" => canvas.fill_mask(|x, y| x.abs() + y.abs() < 0.74),
        "heart" => canvas.fill_mask(|x, y| {
            // Algebraic implicit heart, y up so the lobes sit at the top.
            let hx = x * 1.4;
            let hy = (y + 0.06) * 1.4;
            let q = hx * hx + hy * hy - 1.0;
            q * q * q - hx * hx * hy * hy * hy < 0.0
        }),
        "star5" => star(&mut canvas, 5),
        "star6" => star(&mut canvas, 6),
        "spiral" => spiral(&mut canvas),
        "lissajous" => lissajous(&mut canvas),
        "rose" => rose(&mut canvas),
        "clifford" => attractor(&mut canvas, -1.4, 1.6, 1.0, 0.7, AttractorKind::Clifford),
        "dejong" => attractor(&mut canvas, -2.0, -2.0, -1.2, 2.0, AttractorKind::DeJong),
        "sierpinski" => sierpinski(&mut canvas),
        "dna" => dna(&mut canvas),
        "benzene" => benzene(&mut canvas),
        "graphene" => graphene(&mut canvas),
        "snowflake" => snowflake(&mut canvas),
        _ => canvas.fill_mask(|x, y| x * x + y * y < 0.72 * 0.72),
    }
    canvas.finish()
}

/// N-pointed star: the boundary radius oscillates between an outer and an
/// inner radius as the angle sweeps each wedge.
fn star(canvas: &mut Canvas, points: u32) {
    let wedge_angle = std::f32::consts::TAU / points as f32;
    canvas.fill_mask(|x, y| {
        let r = (x * x + y * y).sqrt();
        let theta = y.atan2(x) + std::f32::consts::PI;
        let wedge = (theta % wedge_angle) / wedge_angle;
        let boundary = 0.32 + (0.78 - 0.32) * (1.0 - 2.0 * wedge).abs();
        r < boundary
    });
}

/// Archimedean spiral, three turns.
fn spiral(canvas: &mut Canvas) {
    let steps = 6000;
    for i in 0..steps {
        let t = i as f32 / steps as f32;
        let theta = t * 3.0 * std::f32::consts::TAU;
        let r = 0.06 + 0.72 * t;
        canvas.plot(r * theta.cos(), r * theta.sin(), 1.0);
    }
}

/// 3:4 Lissajous figure.
fn lissajous(canvas: &mut Canvas) {
    let steps = 8000;
    for i in 0..steps {
        let t = i as f32 / steps as f32 * std::f32::consts::TAU;
        let x = 0.78 * (3.0 * t + std::f32::consts::FRAC_PI_2).sin();
        let y = 0.78 * (4.0 * t).sin();
        canvas.plot(x, y, 1.0);
    }
}

/// Eight-petal rose curve (r = cos 4θ).
fn rose(canvas: &mut Canvas) {
    let steps = 8000;
    for i in 0..steps {
        let theta = i as f32 / steps as f32 * std::f32::consts::TAU;
        let r = 0.8 * (4.0 * theta).cos();
        canvas.plot(r * theta.cos(), r * theta.sin(), 1.0);
    }
}

enum AttractorKind {
    Clifford,
    DeJong,
}

/// Iterated 2D map attractor, accumulated as a point cloud.
fn attractor(canvas: &mut Canvas, a: f32, b: f32, c: f32, d: f32, kind: AttractorKind) {
    let mut x = 0.1f32;
    let mut y = 0.0f32;
    for i in 0..120_000 {
        let (nx, ny) = match kind {
            AttractorKind::Clifford => ((a * y).sin() + c * (a * x).cos(), (b * x).sin() + d * (b * y).cos()),
            AttractorKind::DeJong => ((a * y).sin() - (b * x).cos(), (c * x).sin() - (d * y).cos()),
        };
        x = nx;
        y = ny;
        // Discard the transient before the orbit settles onto the attractor.
        if i > 100 {
            canvas.plot(x * 0.38, y * 0.38, 0.25);
        }
    }
}

/// Sierpinski triangle via the chaos game.
fn sierpinski(canvas: &mut Canvas) {
    let verts = [(0.0f32, 0.78f32), (-0.82, -0.64), (0.82, -0.64)];
    let mut x = 0.0f32;
    let mut y = 0.0f32;
    // Deterministic LCG so the grid is identical run to run.
    let mut state = 0x2545_f491u32;
    for i in 0..150_000 {
        state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
        let (vx, vy) = verts[(state >> 16) as usize % 3];
        x = (x + vx) * 0.5;
        y = (y + vy) * 0.5;
        if i > 10 {
            canvas.plot(x, y, 0.5);
        }
    }
}

/// Double helix along x with rungs between the strands.
fn dna(canvas: &mut Canvas) {
    let steps = 4000;
    let omega = 9.8;
    for i in 0..steps {
        let t = -0.82 + 1.64 * i as f32 / steps as f32;
        let y1 = 0.42 * (omega * t).sin();
        let y2 = 0.42 * (omega * t + std::f32::consts::PI).sin();
        canvas.plot(t, y1, 1.0);
        canvas.plot(t, y2, 1.0);
    }
    // Rungs every quarter period.
    let rungs = 20;
    for i in 0..=rungs {
        let t = -0.82 + 1.64 * i as f32 / rungs as f32;
        let y1 = 0.42 * (omega * t).sin();
        let y2 = 0.42 * (omega * t + std::f32::consts::PI).sin();
        canvas.line(t, y1, t, y2, 0.6);
    }
}

/// Benzene ring: six atom blobs on a hexagon, bond lines, and the inner
/// aromatic circle.
fn benzene(canvas: &mut Canvas) {
    let mut verts = Vec::with_capacity(6);
    for k in 0..6 {
        let theta = k as f32 / 6.0 * std::f32::consts::TAU + std::f32::consts::FRAC_PI_6;
        verts.push((0.58 * theta.cos(), 0.58 * theta.sin()));
    }
    for k in 0..6 {
        let (x0, y0) = verts[k];
        let (x1, y1) = verts[(k + 1) % 6];
        canvas.line(x0, y0, x1, y1, 0.7);
        canvas.disc(x0, y0, 0.11, 1.0);
    }
    let steps = 2000;
    for i in 0..steps {
        let theta = i as f32 / steps as f32 * std::f32::consts::TAU;
        canvas.plot(0.36 * theta.cos(), 0.36 * theta.sin(), 0.5);
    }
}

/// Honeycomb lattice clipped to the canvas interior.
fn graphene(canvas: &mut Canvas) {
    let a = 0.17f32; // bond length
    let dx = a * 3.0f32.sqrt();
    let dy = a * 1.5;
    let mut row = 0;
    let mut cy = -0.85f32;
    while cy < 0.9 {
        let offset = if row % 2 == 0 { 0.0 } else { dx * 0.5 };
        let mut cx = -0.9f32 + offset;
        while cx < 0.95 {
            // One hexagon outline per lattice site; shared edges overlap,
            // which only raises the pre-normalization amplitude.
            let mut prev: Option<(f32, f32)> = None;
            for k in 0..=6 {
                let theta = k as f32 / 6.0 * std::f32::consts::TAU + std::f32::consts::FRAC_PI_6;
                let vx = cx + a * theta.cos();
                let vy = cy + a * theta.sin();
                if let Some((px, py)) = prev {
                    if vx.abs() < 0.92 && vy.abs() < 0.92 {
                        canvas.line(px, py, vx, vy, 0.5);
                    }
                }
                prev = Some((vx, vy));
            }
            cx += dx;
        }
        cy += dy;
        row += 1;
    }
}

/// Koch snowflake, four subdivision rounds.
fn snowflake(canvas: &mut Canvas) {
    let r = 0.78f32;
    let mut segs: Vec<(f32, f32, f32, f32)> = Vec::new();
    let mut pts = Vec::with_capacity(3);
    for k in 0..3 {
        let theta = k as f32 / 3.0 * std::f32::consts::TAU + std::f32::consts::FRAC_PI_2;
        pts.push((r * theta.cos(), r * theta.sin()));
    }
    for k in 0..3 {
        let (x0, y0) = pts[k];
        let (x1, y1) = pts[(k + 1) % 3];
        segs.push((x0, y0, x1, y1));
    }
    for _ in 0..4 {
        let mut next = Vec::with_capacity(segs.len() * 4);
        for &(x0, y0, x1, y1) in &segs {
            let dx = (x1 - x0) / 3.0;
            let dy = (y1 - y0) / 3.0;
            let (ax, ay) = (x0 + dx, y0 + dy);
            let (bx, by) = (x0 + 2.0 * dx, y0 + 2.0 * dy);
            // Peak of the new triangle, rotated -60 degrees off the segment.
            let px = ax + dx * 0.5 + dy * 0.866;
            let py = ay + dy * 0.5 - dx * 0.866;
            next.push((x0, y0, ax, ay));
            next.push((ax, ay, px, py));
            next.push((px, py, bx, by));
            next.push((bx, by, x1, y1));
        }
        segs = next;
    }
    for (x0, y0, x1, y1) in segs {
        canvas.line(x0, y0, x1, y1, 1.0);
    }
}

// ── Canvas ────────────────────────────────────────────────────────────

/// Accumulation canvas in NDC space. Row 0 is NDC y = -1.
struct Canvas {
    w: usize,
    h: usize,
    data: Vec<f32>,
}

impl Canvas {
    fn new(w: usize, h: usize) -> Self {
        Self { w, h, data: vec![0.0; w * h] }
    }

    /// Fill from an implicit mask over NDC coordinates.
    fn fill_mask<F: Fn(f32, f32) -> bool>(&mut self, f: F) {
        for row in 0..self.h {
            let ny = (row as f32 + 0.5) / self.h as f32 * 2.0 - 1.0;
            for col in 0..self.w {
                let nx = (col as f32 + 0.5) / self.w as f32 * 2.0 - 1.0;
                if f(nx, ny) {
                    self.data[row * self.w + col] = 1.0;
                }
            }
        }
    }

    /// Accumulate a point at NDC (x, y).
    fn plot(&mut self, x: f32, y: f32, amount: f32) {
        let col = ((x + 1.0) * 0.5 * self.w as f32) as i32;
        let row = ((y + 1.0) * 0.5 * self.h as f32) as i32;
        if col >= 0 && col < self.w as i32 && row >= 0 && row < self.h as i32 {
            self.data[row as usize * self.w + col as usize] += amount;
        }
    }

    /// Accumulate along a line segment, stepping at half-cell resolution.
    fn line(&mut self, x0: f32, y0: f32, x1: f32, y1: f32, amount: f32) {
        let cell = 2.0 / self.w.max(self.h) as f32;
        let len = ((x1 - x0).powi(2) + (y1 - y0).powi(2)).sqrt();
        let steps = ((len / (cell * 0.5)).ceil() as usize).max(1);
        for i in 0..=steps {
            let t = i as f32 / steps as f32;
            self.plot(x0 + (x1 - x0) * t, y0 + (y1 - y0) * t, amount);
        }
    }

    /// Accumulate a filled disc.
    fn disc(&mut self, cx: f32, cy: f32, radius: f32, amount: f32) {
        let cell = 2.0 / self.w.max(self.h) as f32;
        let steps = ((2.0 * radius / cell).ceil() as i32).max(1);
        for j in -steps..=steps {
            for i in -steps..=steps {
                let x = cx + i as f32 * cell * 0.5;
                let y = cy + j as f32 * cell * 0.5;
                if (x - cx).powi(2) + (y - cy).powi(2) <= radius * radius {
                    self.plot(x, y, amount);
                }
            }
        }
    }

    /// Blur and rescale into the final [0, 1] density grid.
    fn finish(self) -> Vec<f32> {
        let blurred = gaussian_blur(&self.data, self.w, self.h, 1.5);
        normalize(blurred)
    }
}

/// Separable Gaussian blur with clamp-at-edge boundary handling.
fn gaussian_blur(src: &[f32], w: usize, h: usize, sigma: f32) -> Vec<f32> {
    let radius = (sigma * 3.0).ceil() as i32;
    let mut kernel = Vec::with_capacity((2 * radius + 1) as usize);
    let mut sum = 0.0f32;
    for i in -radius..=radius {
        let v = (-(i as f32).powi(2) / (2.0 * sigma * sigma)).exp();
        kernel.push(v);
        sum += v;
    }
    for k in &mut kernel {
        *k /= sum;
    }

    let mut tmp = vec![0.0f32; w * h];
    for row in 0..h {
        for col in 0..w {
            let mut acc = 0.0;
            for (ki, kv) in kernel.iter().enumerate() {
                let c = (col as i32 + ki as i32 - radius).clamp(0, w as i32 - 1) as usize;
                acc += src[row * w + c] * kv;
            }
            tmp[row * w + col] = acc;
        }
    }
    let mut out = vec![0.0f32; w * h];
    for row in 0..h {
        for col in 0..w {
            let mut acc = 0.0;
            for (ki, kv) in kernel.iter().enumerate() {
                let r = (row as i32 + ki as i32 - radius).clamp(0, h as i32 - 1) as usize;
                acc += tmp[r * w + col] * kv;
            }
            out[row * w + col] = acc;
        }
    }
    out
}

/// Rescale to [0, 1]. A flat field is returned unchanged.
fn normalize(mut grid: Vec<f32>) -> Vec<f32> {
    let mut lo = f32::INFINITY;
    let mut hi = f32::NEG_INFINITY;
    for &v in &grid {
        lo = lo.min(v);
        hi = hi.max(v);
    }
    if hi - lo < 1e-6 {
        return grid;
    }
    let inv = 1.0 / (hi - lo);
    for v in &mut grid {
        *v = (*v - lo) * inv;
    }
    grid
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_exact_and_trim() {
        assert_eq!(resolve("DNA"), "dna");
        assert_eq!(resolve("dna"), "dna");
        assert_eq!(resolve(" DNA "), "dna");
    }

    #[test]
    fn test_resolve_alias() {
        assert_eq!(resolve("helix"), "dna");
        assert_eq!(resolve("star"), "star5");
        assert_eq!(resolve("koch"), "snowflake");
    }

    #[test]
    fn test_resolve_prefix() {
        // "circ" is a prefix of "circle"; "snowfla" of "snowflake".
        assert_eq!(resolve("circ"), "circle");
        assert_eq!(resolve("snowfla"), "snowflake");
        // Ties keep registry order: "star" would be ambiguous between
        // star5/star6 but is an alias; "sta" prefers star5.
        assert_eq!(resolve("sta"), "star5");
    }

    #[test]
    fn test_resolve_fallback() {
        assert_eq!(resolve("gibberish"), "circle");
        assert_eq!(resolve(""), "circle");
        assert_eq!(resolve("   "), "circle");
    }

    #[test]
    fn test_resolve_idempotent() {
        for input in ["DNA", "helix", "gibberish", "sta", "RING", "plus", ""] {
            let once = resolve(input);
            assert_eq!(resolve(once), once);
            assert!(CANONICAL.contains(&once));
        }
    }

    #[test]
    fn test_aliases_point_at_canonical_names() {
        for &(alias, target) in ALIASES {
            assert!(CANONICAL.contains(&target), "alias {} -> missing {}", alias, target);
            assert!(!CANONICAL.contains(&alias), "alias {} shadows a canonical name", alias);
        }
    }

    #[test]
    fn test_every_shape_generates_in_range() {
        let mut lib = ShapeLibrary::new(64, 64);
        for &name in CANONICAL {
            let grid = lib.generate(name);
            assert_eq!(grid.len(), 64 * 64, "{}", name);
            let mut mass = 0.0f32;
            for &v in grid {
                assert!((0.0..=1.0).contains(&v), "{} out of range: {}", name, v);
                mass += v;
            }
            assert!(mass > 0.0, "{} generated an empty grid", name);
        }
    }

    #[test]
    fn test_blur_produces_soft_edges() {
        let mut lib = ShapeLibrary::new(128, 128);
        let grid = lib.generate("circle");
        // A blurred mask must contain intermediate values, not just 0/1.
        let soft = grid.iter().filter(|v| **v > 0.1 && **v < 0.9).count();
        assert!(soft > 50, "only {} soft cells", soft);
    }

    #[test]
    fn test_ring_has_a_hole() {
        let mut lib = ShapeLibrary::new(128, 128);
        let grid = lib.generate("ring");
        let center = grid[64 * 128 + 64];
        assert!(center < 0.25, "ring center too dense: {}", center);
    }

    #[test]
    fn test_circle_centered() {
        let mut lib = ShapeLibrary::new(128, 128);
        let grid = lib.generate("circle");
        let (mut mx, mut my, mut mass) = (0.0f64, 0.0f64, 0.0f64);
        for row in 0..128 {
            for col in 0..128 {
                let v = grid[row * 128 + col] as f64;
                mx += v * col as f64;
                my += v * row as f64;
                mass += v;
            }
        }
        assert!((mx / mass - 63.5).abs() < 2.0);
        assert!((my / mass - 63.5).abs() < 2.0);
    }

    #[test]
    fn test_cache_is_stable() {
        let mut lib = ShapeLibrary::new(32, 32);
        let a = lib.generate("dejong").to_vec();
        let b = lib.generate("dejong").to_vec();
        assert_eq!(a, b);
    }
}
