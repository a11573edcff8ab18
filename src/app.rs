use std::time::Duration;

use imageproc::drawing::draw_cross_mut;

use crate::session::{FaceReport, FrameReport};
use crate::utils::{lock, SharedState};

const GOOD: image::Rgb<u8> = image::Rgb([0, 255, 0]);
const BAD: image::Rgb<u8> = image::Rgb([255, 0, 0]);

pub struct PostureApp {
    shared_state: SharedState,
}

impl PostureApp {
    pub fn new(_cc: &eframe::CreationContext<'_>, shared_state: SharedState) -> Self {
        Self { shared_state }
    }
}

impl eframe::App for PostureApp {
    fn update(&mut self, ctx: &egui::Context, frame: &mut eframe::Frame) {
        let (calibrate, quit) = ctx.input(|i| (i.key_pressed(egui::Key::C), i.key_pressed(egui::Key::Q)));

        // take a snapshot so the worker is not blocked while drawing
        let (image, report, fps, resolution, camera_name, finished) = {
            let mut state = lock(&self.shared_state);
            if calibrate {
                state.calibration_requested = true;
            }
            if quit {
                state.quit = true;
            }
            (
                state.image.clone(),
                state.report.clone(),
                state.fps,
                state.resolution,
                state.camera_name.clone(),
                state.finished,
            )
        };

        if quit || finished {
            frame.close();
        }

        egui::TopBottomPanel::top("top_panel").show(ctx, |ui| {
            egui::menu::bar(ui, |ui| {
                ui.menu_button("File", |ui| {
                    if ui.button("Calibrate (C)").clicked() {
                        lock(&self.shared_state).calibration_requested = true;
                    }
                    if ui.button("Quit (Q)").clicked() {
                        lock(&self.shared_state).quit = true;
                        frame.close();
                    }
                });
            });
        });

        egui::SidePanel::left("side_panel").show(ctx, |ui| {
            if let Some(name) = &camera_name {
                ui.label(format!("Camera: {}", name));
            }
            ui.label(format!("FPS: {:.0}", fps.unwrap_or(0.0)));
            let (w, h) = resolution.unwrap_or((0, 0));
            ui.label(format!("Resolution: {}x{}", w, h));

            ui.separator();
            match &report {
                Some(report) => status_labels(ui, report),
                None => {
                    ui.label("Waiting for camera...");
                }
            }
        });

        egui::CentralPanel::default().show(ctx, |ui| {
            let Some(mut image) = image else {
                return;
            };

            let first_face = report.as_ref().and_then(|r| r.faces.first());
            for face in report.iter().flat_map(|r| r.faces.iter()) {
                let color = if face.bad == Some(true) { BAD } else { GOOD };
                for p in face.landmarks_px.iter() {
                    draw_cross_mut(&mut image, color, p.x as i32, p.y as i32);
                }
            }

            let size = [image.width() as usize, image.height() as usize];
            let ui_image = egui::ColorImage::from_rgb(size, image.as_raw().as_slice());
            let texture = ctx.load_texture("frame", ui_image, egui::TextureOptions::default());

            let width = ui.available_width();
            let scale = width / image.width().max(1) as f32;
            let response = ui.image(&texture, egui::Vec2::new(width, image.height() as f32 * scale));

            if let Some(adjusted) = first_face.and_then(|f| f.adjusted) {
                let painter = ui.painter_at(response.rect);
                let origin = response.rect.left_top();
                let rows = [
                    (50.0, format!("x: {}", adjusted.pitch)),
                    (150.0, format!("y: {}", adjusted.yaw)),
                    (250.0, format!("z: {}", adjusted.roll)),
                ];
                for (y, text) in rows {
                    painter.text(
                        origin + egui::vec2(20.0, y) * scale,
                        egui::Align2::LEFT_BOTTOM,
                        text,
                        egui::FontId::proportional((28.0 * scale).max(10.0)),
                        egui::Color32::from_rgb(0, 0, 255),
                    );
                }
            }
        });

        ctx.request_repaint_after(Duration::from_millis(33));
    }

    fn on_close_event(&mut self) -> bool {
        lock(&self.shared_state).quit = true;
        true
    }
}

fn status_labels(ui: &mut egui::Ui, report: &FrameReport) {
    let calibration = if report.calibrated {
        "calibrated"
    } else if report.calibration_pending {
        "waiting for a face"
    } else {
        "press C to calibrate"
    };
    ui.label(format!("Calibration: {}", calibration));

    match report.faces.first() {
        Some(face) => face_labels(ui, face),
        None => {
            ui.label("No face");
        }
    }

    ui.label(format!(
        "Bad posture time: {:.2} s",
        report.bad_posture_time.as_secs_f32()
    ));
}

fn face_labels(ui: &mut egui::Ui, face: &FaceReport) {
    match face.distance_cm {
        Some(d) => ui.label(format!("Distance: {:.1} cm", d)),
        None => ui.label("Distance: -"),
    };

    if let Some(pose) = face.pose {
        ui.label(format!("Raw pose: {} / {} / {}", pose.pitch, pose.yaw, pose.roll));
    }

    match face.bad {
        Some(true) => ui.colored_label(egui::Color32::RED, "Bad posture"),
        Some(false) => ui.colored_label(egui::Color32::GREEN, "Good posture"),
        None => ui.label("Posture: -"),
    };
}
