use stipple_engine::device::GpuBackend;
use stipple_engine::logging::{init_logging, LoggingConfig};
use stipple_engine::window::{LogicalSize, Runtime, RuntimeConfig};
use stipple_engine::{
    App, AppControl, BlendMode, ColorRgba, FrameCtx, Graphics, GraphicsConfig, MeshId,
    PixelShaderMode, TextureId, Topology, Vec2, Vertex, WgpuInit,
};

const CHECKER_SIZE: u32 = 8;

/// Spinning textured quad over a fading color triangle.
#[derive(Default)]
struct Demo {
    quad: Option<MeshId>,
    triangle: Option<MeshId>,
    checker: Option<TextureId>,
    angle: f32,
}

impl Demo {
    fn build<B: GpuBackend>(&mut self, g: &mut Graphics<B>) -> stipple_engine::Result<()> {
        g.set_blend_mode(BlendMode::Blend)?;

        g.start_mesh()?;
        let white = ColorRgba::white();
        for (x, y) in [(-0.5, -0.5), (0.5, -0.5), (0.5, 0.5), (-0.5, 0.5)] {
            g.add_vertex(Vec2::new(x, y), white, Vec2::new(x + 0.5, 0.5 - y))?;
        }
        self.quad = Some(g.end_mesh_indexed(&[0, 1, 2, 0, 2, 3])?);

        g.start_mesh()?;
        g.add_triangle(
            Vertex::new(Vec2::new(0.0, 0.6), ColorRgba::rgb(1.0, 0.2, 0.2), Vec2::ZERO),
            Vertex::new(Vec2::new(0.6, -0.4), ColorRgba::rgb(0.2, 1.0, 0.2), Vec2::ZERO),
            Vertex::new(Vec2::new(-0.6, -0.4), ColorRgba::rgb(0.2, 0.2, 1.0), Vec2::ZERO),
        )?;
        self.triangle = Some(g.end_mesh()?);

        self.checker = Some(g.load_texture_from_memory(&checkerboard(), CHECKER_SIZE, CHECKER_SIZE)?);
        Ok(())
    }

    fn draw<B: GpuBackend>(&mut self, ctx: &mut FrameCtx<'_, B>) -> stipple_engine::Result<()> {
        let (Some(quad), Some(triangle)) = (self.quad, self.triangle) else {
            return Ok(());
        };
        let g = &mut *ctx.graphics;
        self.angle += ctx.time.dt;

        g.set_pixel_shader_mode(PixelShaderMode::Color)?;
        g.set_alpha(0.5 + 0.5 * self.angle.sin())?;
        g.set_transform(Vec2::new(-200.0, 0.0), Vec2::splat(300.0), 0.0)?;
        g.draw_mesh(triangle, Topology::TriangleList)?;

        g.set_pixel_shader_mode(PixelShaderMode::Texture)?;
        g.set_texture(self.checker)?;
        g.set_alpha(1.0)?;
        g.set_texture_offset(Vec2::new(self.angle * 0.1, 0.0))?;
        g.set_transform(Vec2::new(200.0, 0.0), Vec2::splat(240.0), self.angle)?;
        g.draw_mesh(quad, Topology::TriangleList)?;
        Ok(())
    }
}

impl App for Demo {
    fn on_init<B: GpuBackend>(&mut self, graphics: &mut Graphics<B>) -> AppControl {
        match self.build(graphics) {
            Ok(()) => AppControl::Continue,
            Err(_) => AppControl::Exit,
        }
    }

    fn on_frame<B: GpuBackend>(&mut self, ctx: &mut FrameCtx<'_, B>) -> AppControl {
        match self.draw(ctx) {
            Err(err) if err.is_fatal() => AppControl::Exit,
            _ => AppControl::Continue,
        }
    }

    fn on_exit<B: GpuBackend>(&mut self, graphics: &mut Graphics<B>) {
        graphics.free_mesh(&mut self.quad);
        graphics.free_mesh(&mut self.triangle);
        graphics.free_texture(&mut self.checker);
    }
}

fn checkerboard() -> Vec<u8> {
    (0..CHECKER_SIZE * CHECKER_SIZE)
        .flat_map(|i| {
            let (x, y) = (i % CHECKER_SIZE, i / CHECKER_SIZE);
            if (x + y) % 2 == 0 {
                [235, 235, 235, 255]
            } else {
                [40, 40, 60, 255]
            }
        })
        .collect()
}

fn main() -> anyhow::Result<()> {
    init_logging(LoggingConfig::default());

    let config = RuntimeConfig {
        title: "stipple demo".to_string(),
        initial_size: LogicalSize::new(1024.0, 640.0),
        max_frame_rate: 120,
        graphics: GraphicsConfig {
            background: ColorRgba::rgb(0.08, 0.09, 0.12),
            ..GraphicsConfig::default()
        },
    };

    Runtime::run(config, WgpuInit::default(), Demo::default())?;
    log::info!("demo exited cleanly");
    Ok(())
}
