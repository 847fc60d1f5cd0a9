//! Ratatui-based terminal UI.
//!
//! Runs a fit, then shows the posterior summary next to either the walker
//! traces of the selected parameter or the colour-magnitude diagram with the
//! posterior-median isochrone. Reruns reuse the loaded grids and observations.

use std::io;
use std::time::Duration;

use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use plotters::style::RGBColor;
use ratatui::{
    Terminal,
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Style},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Clear, List, ListItem, Paragraph},
};

use crate::app::pipeline::{self, RunOutput};
use crate::domain::FitConfig;
use crate::error::AppError;
use crate::plot::{CmdAxes, TRACK_SAMPLES, isochrone_track, observed_points};
use crate::sampler::Chain;

mod plotters_chart;

use plotters_chart::{ChartSeries, PlottersChart, SeriesStyle};

const WALKER_PALETTE: &[RGBColor] = &[
    RGBColor(0, 255, 255),
    RGBColor(255, 0, 255),
    RGBColor(255, 255, 0),
    RGBColor(0, 255, 0),
    RGBColor(255, 128, 0),
    RGBColor(128, 128, 255),
];
const STAR_COLOR: RGBColor = RGBColor(255, 255, 255);
const TRACK_COLOR: RGBColor = RGBColor(0, 255, 255);

/// Start the TUI with `config`. Inputs are loaded and the first fit runs
/// before the terminal switches to the alternate screen.
pub fn run(config: FitConfig) -> Result<(), AppError> {
    let output = pipeline::run_fit(&config)?;
    let mut app = App::new(config, output);

    let _guard = TerminalGuard::new()?;
    let backend = CrosstermBackend::new(io::stdout());
    let mut terminal = Terminal::new(backend)
        .map_err(|e| AppError::new(4, format!("Failed to initialize terminal: {e}")))?;

    app.event_loop(&mut terminal)
}

/// Ensures the terminal is restored (raw mode, alternate screen) on exit.
struct TerminalGuard;

impl TerminalGuard {
    fn new() -> Result<Self, AppError> {
        enable_raw_mode().map_err(|e| AppError::new(4, format!("Failed to enable raw mode: {e}")))?;
        if let Err(e) = execute!(io::stdout(), EnterAlternateScreen) {
            let _ = disable_raw_mode();
            return Err(AppError::new(4, format!("Failed to enter alternate screen: {e}")));
        }
        Ok(Self)
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
        let _ = execute!(io::stdout(), LeaveAlternateScreen);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum View {
    Trace,
    Cmd,
}

struct App {
    config: FitConfig,
    output: RunOutput,
    selected_param: usize,
    view: View,
    status: String,
}

impl App {
    fn new(config: FitConfig, output: RunOutput) -> Self {
        let status = format!("Mean acceptance {:.3}", output.run.chain().mean_acceptance());
        Self {
            config,
            output,
            selected_param: 0,
            view: View::Trace,
            status,
        }
    }

    fn event_loop<B: ratatui::backend::Backend>(&mut self, terminal: &mut Terminal<B>) -> Result<(), AppError> {
        let mut needs_redraw = true;
        loop {
            if needs_redraw {
                terminal
                    .draw(|f| self.draw(f))
                    .map_err(|e| AppError::new(4, format!("Terminal draw error: {e}")))?;
                needs_redraw = false;
            }

            if !event::poll(Duration::from_millis(100))
                .map_err(|e| AppError::new(4, format!("Event poll error: {e}")))?
            {
                continue;
            }

            match event::read().map_err(|e| AppError::new(4, format!("Event read error: {e}")))? {
                Event::Key(key) => {
                    if key.kind != KeyEventKind::Press {
                        continue;
                    }
                    if self.handle_key(key.code) {
                        break;
                    }
                    needs_redraw = true;
                }
                Event::Resize(_, _) => needs_redraw = true,
                _ => {}
            }
        }
        Ok(())
    }

    /// Returns `true` when the UI should exit.
    fn handle_key(&mut self, code: KeyCode) -> bool {
        let n_params = self.output.summaries.len();
        match code {
            KeyCode::Char('q') | KeyCode::Esc => return true,
            KeyCode::Up => self.selected_param = self.selected_param.saturating_sub(1),
            KeyCode::Down => {
                if self.selected_param + 1 < n_params {
                    self.selected_param += 1;
                }
            }
            KeyCode::Tab | KeyCode::Char('c') => {
                self.view = match self.view {
                    View::Trace => View::Cmd,
                    View::Cmd => View::Trace,
                };
            }
            KeyCode::Char('r') => {
                self.config.seed = self.config.seed.wrapping_add(1);
                self.rerun(format!("seed {}", self.config.seed));
            }
            KeyCode::Char('+') => {
                self.config.steps = self.config.steps.saturating_mul(2);
                self.rerun(format!("steps {}", self.config.steps));
            }
            KeyCode::Char('-') => {
                let halved = (self.config.steps / 2).max(self.config.burn_in + 1);
                self.config.steps = halved;
                self.rerun(format!("steps {}", self.config.steps));
            }
            KeyCode::Char('e') => {
                self.status = match pipeline::write_exports(&self.output, &self.config) {
                    Ok(()) if self.config.export_chain.is_none() && self.config.export_run.is_none() => {
                        "No export paths configured (--export-chain / --export-run).".to_string()
                    }
                    Ok(()) => "Exports written.".to_string(),
                    Err(err) => format!("Export failed: {err}"),
                };
            }
            _ => {}
        }
        false
    }

    fn rerun(&mut self, what: String) {
        let result = pipeline::run_fit_with_inputs(
            &self.config,
            self.output.grids.clone(),
            self.output.observations.clone(),
            self.output.stats,
        );
        self.status = match result {
            Ok(output) => {
                let acceptance = output.run.chain().mean_acceptance();
                self.output = output;
                format!("Reran with {what}: mean acceptance {acceptance:.3}")
            }
            Err(err) => format!("Rerun with {what} failed: {err}"),
        };
    }

    fn draw(&self, frame: &mut ratatui::Frame<'_>) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Length(4), Constraint::Min(0), Constraint::Length(3)])
            .split(frame.area());

        self.draw_header(frame, chunks[0]);
        self.draw_body(frame, chunks[1]);
        self.draw_footer(frame, chunks[2]);
    }

    fn draw_header(&self, frame: &mut ratatui::Frame<'_>, area: Rect) {
        let chain = self.output.run.chain();
        let lines = vec![
            Line::from(vec![
                Span::styled("cmdfit", Style::default().fg(Color::Cyan)),
                Span::raw(format!(" | {} fit", self.config.mode.display_name())),
            ]),
            Line::from(Span::styled(
                format!(
                    "stars={} | bands={} | walkers={} | steps={} | burn-in={} | seed={} | acceptance={:.3}",
                    self.output.observations.star_count(),
                    self.output.observations.bands().join(","),
                    chain.n_walkers(),
                    chain.n_steps(),
                    self.config.burn_in,
                    self.config.seed,
                    chain.mean_acceptance(),
                ),
                Style::default().fg(Color::Gray),
            )),
        ];
        let p = Paragraph::new(Text::from(lines)).block(Block::default().borders(Borders::ALL));
        frame.render_widget(p, area);
    }

    fn draw_body(&self, frame: &mut ratatui::Frame<'_>, area: Rect) {
        let chunks = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Length(42), Constraint::Min(0)])
            .split(area);

        self.draw_summaries(frame, chunks[0]);
        match self.view {
            View::Trace => self.draw_trace(frame, chunks[1]),
            View::Cmd => self.draw_cmd(frame, chunks[1]),
        }
    }

    fn draw_summaries(&self, frame: &mut ratatui::Frame<'_>, area: Rect) {
        let items: Vec<ListItem> = self
            .output
            .summaries
            .iter()
            .map(|s| ListItem::new(format!("{:<15} {:>9.4} ± {:.4}", s.name, s.median, s.sigma())))
            .collect();
        let list = List::new(items)
            .block(Block::default().title("Posterior median ± 1σ").borders(Borders::ALL))
            .highlight_style(Style::default().fg(Color::Black).bg(Color::White))
            .highlight_symbol("» ");

        let mut state = ratatui::widgets::ListState::default();
        state.select(Some(self.selected_param));
        frame.render_stateful_widget(list, area, &mut state);
    }

    fn draw_trace(&self, frame: &mut ratatui::Frame<'_>, area: Rect) {
        let chain = self.output.run.chain();
        let name = chain.param_names().get(self.selected_param).cloned().unwrap_or_default();
        let block = Block::default().title(format!("Trace: {name}")).borders(Borders::ALL);
        let inner = block.inner(area);
        frame.render_widget(block, area);
        frame.render_widget(Clear, inner);

        let (traces, x_bounds, y_bounds) = trace_series(chain, self.selected_param);
        let series: Vec<ChartSeries> = traces
            .iter()
            .enumerate()
            .map(|(walker, points)| ChartSeries {
                points,
                color: WALKER_PALETTE[walker % WALKER_PALETTE.len()],
                style: SeriesStyle::Line,
            })
            .collect();
        let widget = PlottersChart {
            series: &series,
            x_bounds,
            y_bounds,
            x_label: "step",
            y_label: &name,
            fmt_x: fmt_axis_step,
            fmt_y: fmt_axis_value,
        };
        frame.render_widget(widget, inner);
    }

    fn draw_cmd(&self, frame: &mut ratatui::Frame<'_>, area: Rect) {
        let block = Block::default().title("Colour-magnitude diagram").borders(Borders::ALL);
        let inner = block.inner(area);
        frame.render_widget(block, area);
        frame.render_widget(Clear, inner);

        let Some(cmd) = cmd_series(&self.output) else {
            let msg = Paragraph::new("A colour-magnitude diagram needs at least two bands.")
                .style(Style::default().fg(Color::Yellow));
            frame.render_widget(msg, inner);
            return;
        };

        let series = [
            ChartSeries {
                points: &cmd.track,
                color: TRACK_COLOR,
                style: SeriesStyle::Line,
            },
            ChartSeries {
                points: &cmd.stars,
                color: STAR_COLOR,
                style: SeriesStyle::Dots,
            },
        ];
        let widget = PlottersChart {
            series: &series,
            x_bounds: cmd.x_bounds,
            y_bounds: cmd.y_bounds,
            x_label: &cmd.x_label,
            y_label: &cmd.y_label,
            fmt_x: fmt_axis_value,
            fmt_y: fmt_axis_negated,
        };
        frame.render_widget(widget, inner);
    }

    fn draw_footer(&self, frame: &mut ratatui::Frame<'_>, area: Rect) {
        let help = "↑/↓ parameter  Tab trace/CMD  r reseed  +/- steps  e export  q quit";
        let line = Line::from(vec![
            Span::styled(help, Style::default().fg(Color::Gray)),
            Span::raw(" | "),
            Span::styled(&self.status, Style::default().fg(Color::Yellow)),
        ]);
        let p = Paragraph::new(line).block(Block::default().borders(Borders::ALL));
        frame.render_widget(p, area);
    }
}

/// Per-walker `(step, value)` series plus padded bounds.
fn trace_series(chain: &Chain, param: usize) -> (Vec<Vec<(f64, f64)>>, [f64; 2], [f64; 2]) {
    if param >= chain.ndim() {
        return (Vec::new(), [0.0, 1.0], [0.0, 1.0]);
    }
    let traces: Vec<Vec<(f64, f64)>> = (0..chain.n_walkers())
        .map(|w| {
            chain
                .walker_trace(w, param)
                .into_iter()
                .enumerate()
                .map(|(step, v)| (step as f64, v))
                .collect()
        })
        .collect();
    let x_bounds = [0.0, (chain.n_steps().saturating_sub(1)).max(1) as f64];
    let y_bounds = padded_bounds(traces.iter().flatten().map(|p| p.1));
    (traces, x_bounds, y_bounds)
}

/// CMD series with magnitudes negated, so brighter stars plot higher.
struct CmdSeries {
    stars: Vec<(f64, f64)>,
    track: Vec<(f64, f64)>,
    x_bounds: [f64; 2],
    y_bounds: [f64; 2],
    x_label: String,
    y_label: String,
}

fn cmd_series(output: &RunOutput) -> Option<CmdSeries> {
    let axes = CmdAxes::for_band_count(output.observations.band_count())?;
    let flip = |(x, y): (f64, f64)| (x, -y);
    let stars: Vec<(f64, f64)> = observed_points(&output.observations, axes)
        .into_iter()
        .map(flip)
        .collect();
    let track: Vec<(f64, f64)> = output
        .median()
        .map(|p| isochrone_track(&output.grids, p.feh(), p.age(), axes, TRACK_SAMPLES))
        .unwrap_or_default()
        .into_iter()
        .map(flip)
        .collect();

    let all = || stars.iter().chain(&track);
    let x_bounds = padded_bounds(all().map(|p| p.0));
    let y_bounds = padded_bounds(all().map(|p| p.1));
    let (x_label, y_label) = axes.labels(output.observations.bands());
    Some(CmdSeries {
        stars,
        track,
        x_bounds,
        y_bounds,
        x_label,
        y_label,
    })
}

fn padded_bounds(values: impl Iterator<Item = f64>) -> [f64; 2] {
    let (mut lo, mut hi) = values
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)));
    if !lo.is_finite() || !hi.is_finite() {
        return [0.0, 1.0];
    }
    if hi <= lo {
        lo -= 0.5;
        hi += 0.5;
    }
    let pad = ((hi - lo) * 0.05).max(1e-12);
    [lo - pad, hi + pad]
}

fn fmt_axis_step(v: f64) -> String {
    format!("{v:.0}")
}

fn fmt_axis_value(v: f64) -> String {
    format!("{v:.2}")
}

fn fmt_axis_negated(v: f64) -> String {
    format!("{:.1}", -v)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::DMatrix;

    #[test]
    fn trace_series_has_one_line_per_walker() {
        let steps = (0..4)
            .map(|s| (DMatrix::from_row_slice(2, 1, &[s as f64, 10.0]), vec![0.0, 0.0]))
            .collect();
        let chain = Chain::from_steps(vec!["feh".into()], steps);
        let (traces, x_bounds, y_bounds) = trace_series(&chain, 0);
        assert_eq!(traces.len(), 2);
        assert_eq!(traces[0], vec![(0.0, 0.0), (1.0, 1.0), (2.0, 2.0), (3.0, 3.0)]);
        assert_eq!(x_bounds, [0.0, 3.0]);
        assert!(y_bounds[0] < 0.0 && y_bounds[1] > 10.0);

        let (empty, _, _) = trace_series(&chain, 5);
        assert!(empty.is_empty());
    }

    #[test]
    fn bounds_handle_degenerate_input() {
        assert_eq!(padded_bounds(std::iter::empty()), [0.0, 1.0]);
        let [lo, hi] = padded_bounds([2.0, 2.0].into_iter());
        assert!(lo < 2.0 && hi > 2.0);
        assert_eq!(fmt_axis_negated(-12.34), "12.3");
    }
}
