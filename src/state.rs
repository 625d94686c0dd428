use crate::backend::{Backend, BlendFunc, PolygonMode, Toggle};

/// Texture units the projector binds to
pub const TEXTURE_UNITS: [u32; 2] = [0, 1];

/// The pipeline state the projector may change during one of its passes
pub struct RenderState<B: Backend> {
    pub program: Option<B::Program>,
    pub framebuffer: Option<B::Framebuffer>,
    pub viewport: [i32; 4],
    pub toggles: Vec<(Toggle, bool)>,
    pub polygon_offset: (f32, f32),
    pub polygon_mode: PolygonMode,
    pub blend_func: BlendFunc,
    pub active_unit: u32,
    pub textures: Vec<(u32, Option<B::Texture>)>,
}

impl<B: Backend> RenderState<B> {
    pub fn capture(backend: &B) -> Self {
        // Querying a unit's binding switches the active unit
        let active_unit = backend.active_texture_unit();
        let textures = TEXTURE_UNITS
            .iter()
            .map(|&unit| (unit, backend.bound_texture(unit)))
            .collect();

        Self {
            program: backend.current_program(),
            framebuffer: backend.current_framebuffer(),
            viewport: backend.viewport(),
            toggles: Toggle::ALL
                .iter()
                .map(|&t| (t, backend.is_enabled(t)))
                .collect(),
            polygon_offset: backend.polygon_offset(),
            polygon_mode: backend.polygon_mode(),
            blend_func: backend.blend_func(),
            active_unit,
            textures,
        }
    }

    pub fn apply(&self, backend: &B) {
        backend.use_program(self.program);
        backend.bind_framebuffer(self.framebuffer);
        backend.set_viewport(self.viewport);
        for &(toggle, enabled) in &self.toggles {
            backend.set_enabled(toggle, enabled);
        }
        let (factor, units) = self.polygon_offset;
        backend.set_polygon_offset(factor, units);
        backend.set_polygon_mode(self.polygon_mode);
        backend.set_blend_func(self.blend_func);
        for &(unit, texture) in &self.textures {
            backend.bind_texture(unit, texture);
        }
        backend.set_active_texture_unit(self.active_unit);
    }
}

/// Snapshots the render state on creation and puts it back when dropped,
/// whichever way the enclosing scope is left.
pub struct RenderStateGuard<'a, B: Backend> {
    backend: &'a B,
    saved: RenderState<B>,
}

impl<'a, B: Backend> RenderStateGuard<'a, B> {
    pub fn new(backend: &'a B) -> Self {
        Self {
            saved: RenderState::capture(backend),
            backend,
        }
    }
}

impl<B: Backend> Drop for RenderStateGuard<'_, B> {
    fn drop(&mut self) {
        self.saved.apply(self.backend);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::fake::FakeBackend;

    #[test]
    fn test_guard_restores_everything() {
        let gl = FakeBackend::new();
        gl.set_viewport([0, 0, 640, 480]);
        gl.set_enabled(Toggle::Blend, true);
        gl.bind_texture(1, Some(77));
        gl.set_active_texture_unit(0);
        let before = gl.state.borrow().clone();

        {
            let _guard = RenderStateGuard::new(&gl);
            gl.use_program(Some(3));
            gl.bind_framebuffer(Some(9));
            gl.set_viewport([0, 0, 16, 16]);
            gl.set_enabled(Toggle::Blend, false);
            gl.set_enabled(Toggle::DepthTest, true);
            gl.set_polygon_offset(2., 2.);
            gl.set_polygon_mode(PolygonMode::Line);
            gl.bind_texture(0, Some(5));
            gl.bind_texture(1, None);
        }

        let after = gl.state.borrow().clone();
        assert_eq!(after.program, before.program);
        assert_eq!(after.framebuffer, before.framebuffer);
        assert_eq!(after.viewport, [0, 0, 640, 480]);
        assert_eq!(after.enabled, before.enabled);
        assert_eq!(after.polygon_offset, before.polygon_offset);
        assert_eq!(after.polygon_mode, PolygonMode::Fill);
        assert_eq!(after.textures, before.textures);
        assert_eq!(after.active_unit, 0);
    }

    #[test]
    fn test_guard_restores_on_early_return() {
        fn upload() -> Result<(), ()> {
            Err(())
        }

        fn failing_pass(gl: &FakeBackend) -> Result<(), ()> {
            let _guard = RenderStateGuard::new(gl);
            gl.set_viewport([1, 2, 3, 4]);
            gl.set_enabled(Toggle::PolygonOffsetFill, true);
            upload()?;
            gl.set_viewport([5, 6, 7, 8]);
            Ok(())
        }

        let gl = FakeBackend::new();
        assert!(failing_pass(&gl).is_err());
        assert_eq!(gl.viewport(), [0, 0, 800, 600]);
        assert!(!gl.is_enabled(Toggle::PolygonOffsetFill));
    }
}
