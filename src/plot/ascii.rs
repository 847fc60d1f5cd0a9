//! ASCII plotting for terminal output.
//!
//! Fixed-size character grids, deterministic output (golden tests).
//!
//! Plot elements:
//! - observed stars: `o`
//! - model isochrone: `-` line
//! - trace plots: one glyph per walker

use crate::sampler::Chain;

const WALKER_GLYPHS: &[char] = &[
    '0', '1', '2', '3', '4', '5', '6', '7', '8', '9', 'a', 'b', 'c', 'd', 'e', 'f', 'g', 'h', 'i', 'j', 'k',
    'l', 'm', 'n', 'o', 'p', 'q', 'r', 's', 't', 'u', 'v', 'w', 'x', 'y', 'z',
];

/// Colour-magnitude diagram. Brighter (smaller) magnitudes are at the top.
pub fn render_cmd(stars: &[(f64, f64)], track: &[(f64, f64)], width: usize, height: usize) -> String {
    let width = width.max(10);
    let height = height.max(5);

    let all = || stars.iter().chain(track);
    let (x_min, x_max) = range(all().map(|p| p.0)).unwrap_or((0.0, 1.0));
    let (y_min, y_max) = range(all().map(|p| p.1)).unwrap_or((0.0, 1.0));
    let (y_min, y_max) = pad_range(y_min, y_max, 0.05);

    let mut grid = vec![vec![' '; width]; height];
    let to_cell = |(x, y): (f64, f64)| {
        (
            map_x(x, x_min, x_max, width),
            map_y_inverted(y, y_min, y_max, height),
        )
    };

    // Curve first so stars overlay it.
    draw_polyline(&mut grid, track.iter().copied().map(to_cell), '-');
    for &p in stars {
        let (x, y) = to_cell(p);
        grid[y][x] = 'o';
    }

    let mut out = format!(
        "CMD: colour=[{x_min:.3}, {x_max:.3}] | mag=[{y_min:.2}, {y_max:.2}] (bright at top)\n"
    );
    push_rows(&mut out, grid);
    out
}

/// Trace of one parameter: step on x, value on y, one glyph per walker.
pub fn render_trace(chain: &Chain, param: usize, width: usize, height: usize) -> String {
    let width = width.max(10);
    let height = height.max(5);
    let name = chain.param_names().get(param).cloned().unwrap_or_default();
    let steps = chain.n_steps();

    let traces: Vec<Vec<f64>> = if param < chain.ndim() {
        (0..chain.n_walkers()).map(|w| chain.walker_trace(w, param)).collect()
    } else {
        Vec::new()
    };
    let (v_min, v_max) = range(traces.iter().flatten().copied()).unwrap_or((0.0, 1.0));
    let (v_min, v_max) = pad_range(v_min, v_max, 0.05);

    let mut grid = vec![vec![' '; width]; height];
    let last_step = steps.saturating_sub(1).max(1) as f64;
    for (walker, trace) in traces.iter().enumerate() {
        let glyph = WALKER_GLYPHS[walker % WALKER_GLYPHS.len()];
        for (step, &v) in trace.iter().enumerate() {
            if !v.is_finite() {
                continue;
            }
            let x = map_x(step as f64, 0.0, last_step, width);
            let y = map_y(v, v_min, v_max, height);
            grid[y][x] = glyph;
        }
    }

    let mut out = format!(
        "Trace: {name} | steps={steps} | walkers={} | y=[{v_min:.3}, {v_max:.3}]\n",
        traces.len()
    );
    push_rows(&mut out, grid);
    out
}

fn push_rows(out: &mut String, grid: Vec<Vec<char>>) {
    for row in grid {
        out.push_str(&row.into_iter().collect::<String>());
        out.push('\n');
    }
}

fn range(values: impl Iterator<Item = f64>) -> Option<(f64, f64)> {
    let (lo, hi) = values
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)));
    if lo.is_finite() && hi.is_finite() && hi > lo {
        Some((lo, hi))
    } else if lo.is_finite() && hi.is_finite() {
        Some((lo - 0.5, hi + 0.5))
    } else {
        None
    }
}

fn pad_range(min: f64, max: f64, frac: f64) -> (f64, f64) {
    let span = (max - min).abs();
    let pad = (span * frac).max(1e-12);
    (min - pad, max + pad)
}

fn map_x(x: f64, x_min: f64, x_max: f64, width: usize) -> usize {
    let width = width.max(2);
    let u = ((x - x_min) / (x_max - x_min)).clamp(0.0, 1.0);
    (u * (width as f64 - 1.0)).round() as usize
}

fn map_y(y: f64, y_min: f64, y_max: f64, height: usize) -> usize {
    let height = height.max(2);
    let u = ((y - y_min) / (y_max - y_min)).clamp(0.0, 1.0);
    // y_max on row 0
    (height as f64 - 1.0 - (u * (height as f64 - 1.0))).round() as usize
}

fn map_y_inverted(y: f64, y_min: f64, y_max: f64, height: usize) -> usize {
    height.max(2) - 1 - map_y(y, y_min, y_max, height)
}

fn draw_polyline(grid: &mut [Vec<char>], cells: impl Iterator<Item = (usize, usize)>, ch: char) {
    let mut prev = None;
    for (x, y) in cells {
        match prev {
            Some((x0, y0)) => draw_line(grid, x0, y0, x, y, ch),
            None => grid[y][x] = ch,
        }
        prev = Some((x, y));
    }
}

/// Integer line drawing (Bresenham-ish).
fn draw_line(grid: &mut [Vec<char>], x0: usize, y0: usize, x1: usize, y1: usize, ch: char) {
    let mut x0 = x0 as isize;
    let mut y0 = y0 as isize;
    let x1 = x1 as isize;
    let y1 = y1 as isize;

    let dx = (x1 - x0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let dy = -(y1 - y0).abs();
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;

    loop {
        if y0 >= 0
            && (y0 as usize) < grid.len()
            && x0 >= 0
            && (x0 as usize) < grid[0].len()
            && grid[y0 as usize][x0 as usize] == ' '
        {
            grid[y0 as usize][x0 as usize] = ch;
        }

        if x0 == x1 && y0 == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x0 += sx;
        }
        if e2 <= dx {
            err += dx;
            y0 += sy;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::DMatrix;

    #[test]
    fn cmd_golden_snapshot_small() {
        let stars = [(0.0, 10.0), (1.0, 12.0)];
        let track = [(0.0, 10.0), (1.0, 12.0)];
        let txt = render_cmd(&stars, &track, 10, 5);
        let expected = concat!(
            "CMD: colour=[0.000, 1.000] | mag=[9.90, 12.10] (bright at top)\n",
            "o-        \n",
            "  --      \n",
            "    --    \n",
            "      --  \n",
            "        -o\n",
        );
        assert_eq!(txt, expected);
    }

    #[test]
    fn cmd_without_track_only_has_stars() {
        let txt = render_cmd(&[(0.0, 10.0), (1.0, 12.0)], &[], 10, 5);
        assert!(txt.lines().nth(1).unwrap().starts_with('o'));
        assert!(txt.lines().last().unwrap().ends_with('o'));
        assert!(!txt.contains('-'));
    }

    #[test]
    fn trace_uses_one_glyph_per_walker() {
        // Two walkers, three steps, one parameter. Walker 0 sits low, walker 1 high.
        let steps = (0..3)
            .map(|_| (DMatrix::from_row_slice(2, 1, &[0.0, 1.0]), vec![0.0, 0.0]))
            .collect();
        let chain = Chain::from_steps(vec!["feh".into()], steps);
        let txt = render_trace(&chain, 0, 12, 6);
        let lines: Vec<&str> = txt.lines().collect();
        assert_eq!(lines.len(), 7);
        assert!(lines[0].starts_with("Trace: feh | steps=3 | walkers=2"));
        assert!(lines[1].contains('1') && !lines[1].contains('0'));
        assert!(lines[6].contains('0') && !lines[6].contains('1'));
    }
}
