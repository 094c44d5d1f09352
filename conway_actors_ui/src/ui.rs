// ui.rs - egui front end: paints the frame buffer the cells draw into,
// exposes the live rate knobs, and turns clicks into drawn life

use eframe::egui;
use egui::{Color32, Rect, Stroke, Vec2};
use std::time::Duration;
use crate::{GameOfLife, GRID_SIZE, patterns};

const REPAINT_EVERY: Duration = Duration::from_millis(33);
const MAX_RATE_MS: u64 = 1000;

impl eframe::App for GameOfLife {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        egui::CentralPanel::default().show(ctx, |ui| {
            ui.heading("Conway's Game of Life (one actor per cell)");

            // Controls
            ui.horizontal(|ui| {
                if ui.button("⏹ Clear").clicked() {
                    self.clear_grid();
                }

                if ui.button("🎲 Random").clicked() {
                    self.apply_random_pattern();
                }

                ui.separator();

                // Pattern dropdown
                ui.label("Pattern:");
                egui::ComboBox::from_id_source("pattern_selector")
                    .selected_text(patterns::PATTERNS[self.selected_pattern].name)
                    .show_ui(ui, |ui| {
                        for (i, pattern) in patterns::PATTERNS.iter().enumerate() {
                            ui.selectable_value(&mut self.selected_pattern, i, pattern.name);
                        }
                    });

                if ui.button("Apply Pattern").clicked() {
                    self.apply_selected_pattern();
                }
            });

            ui.separator();

            // Rate knobs, shared by every running cell
            let rates = self.world.rates();
            ui.horizontal(|ui| {
                let mut read_ms = rates.read_interval_ms();
                ui.label("Read rate:");
                if ui.add(egui::Slider::new(&mut read_ms, 1..=MAX_RATE_MS).suffix(" ms")).changed() {
                    rates.set_read_interval_ms(read_ms);
                }

                ui.separator();

                let mut broadcast_ms = rates.broadcast_interval_ms();
                ui.label("Broadcast rate:");
                if ui.add(egui::Slider::new(&mut broadcast_ms, 1..=MAX_RATE_MS).suffix(" ms")).changed() {
                    rates.set_broadcast_interval_ms(broadcast_ms);
                }
            });

            ui.horizontal(|ui| {
                ui.label("Live:");
                ui.color_edit_button_srgba(&mut self.live_color);
                ui.label("Dead:");
                ui.color_edit_button_srgba(&mut self.dead_color);
            });

            ui.separator();

            ui.label("Every cell samples its neighbours on its own clock; the grid is only eventually consistent.");
            ui.label("Click or drag on the grid to draw clusters of life.");

            ui.separator();

            // Draw the grid from the frame buffer
            let box_size = 15.0;
            let spacing = 0.5;
            let grid = self.frame.alive_cells();

            let start_pos = ui.cursor().min;
            let total_size = Vec2::splat((box_size + spacing) * GRID_SIZE as f32 - spacing);

            let (response, painter) = ui.allocate_painter(total_size, egui::Sense::click_and_drag());

            // Fill background
            painter.rect_filled(
                Rect::from_min_size(start_pos, total_size),
                0.0,
                Color32::BLACK,
            );

            for (row, cells) in grid.iter().enumerate() {
                for (col, &alive) in cells.iter().enumerate() {
                    let x = start_pos.x + col as f32 * (box_size + spacing);
                    let y = start_pos.y + row as f32 * (box_size + spacing);

                    let rect = Rect::from_min_size(
                        egui::pos2(x, y),
                        Vec2::splat(box_size),
                    );

                    let cell_color = if alive { self.live_color } else { self.dead_color };
                    painter.rect_filled(rect, 1.0, cell_color);
                    painter.rect_stroke(rect, 1.0, Stroke::new(0.2, Color32::from_gray(60)));
                }
            }

            // Pointer -> grid cell, ignoring anything off the grid
            if response.clicked() || response.dragged() {
                if let Some(pos) = response.interact_pointer_pos() {
                    let col = ((pos.x - start_pos.x) / (box_size + spacing)).floor();
                    let row = ((pos.y - start_pos.y) / (box_size + spacing)).floor();
                    if row >= 0.0 && col >= 0.0 && (row as usize) < GRID_SIZE && (col as usize) < GRID_SIZE {
                        self.draw_life(row as usize, col as usize);
                    }
                }
            }
            if response.drag_released() || response.clicked() {
                self.release_pointer();
            }

            ui.separator();

            let live_cells = self.world.population();
            let total = GRID_SIZE * GRID_SIZE;
            ui.horizontal(|ui| {
                ui.label(format!("Live cells: {}", live_cells));
                ui.label(format!("Dead cells: {}", total - live_cells));
                ui.label(format!("Population: {:.1}%", (live_cells as f32 / total as f32) * 100.0));
            });

            ui.monospace(self.frame.stats_line().unwrap_or_default());
        });

        // Cells change on their own, keep repainting
        ctx.request_repaint_after(REPAINT_EVERY);
    }
}
