use glam::*;

/// Represents a 3D entity transform, with a translation and any 3D transformation that can be
/// represented by a 3x3 matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct Transform(pub Affine3A);

impl Default for Transform {
    fn default() -> Self {
        Self(Affine3A::IDENTITY)
    }
}

impl Transform {
    pub fn from_translation(position: Vec3) -> Self {
        Self(Affine3A::from_translation(position))
    }

    /// Builds a transform out of a position and XYZ Euler angles in degrees.
    pub fn from_position_euler(position: Vec3, degrees: Vec3) -> Self {
        let rotation = Quat::from_euler(
            EulerRot::XYZ,
            degrees.x.to_radians(),
            degrees.y.to_radians(),
            degrees.z.to_radians(),
        );
        Self(Affine3A::from_rotation_translation(rotation, position))
    }

    /// Returns the transform's translation.
    #[inline]
    pub fn position(&self) -> Vec3 {
        self.0.translation.into()
    }

    /// Converts the internal transform into a [`Mat4`].
    #[inline]
    pub fn as_mat4(&self) -> Mat4 {
        self.0.into()
    }

    /// Extracts the rotation out of this transform.
    #[inline]
    pub fn rotation(&self) -> Quat {
        Quat::from_affine3(&self.0)
    }

    /// Direction the transform is facing. Entities look down their local -Z axis.
    #[inline]
    pub fn forward(&self) -> Vec3 {
        self.0.transform_vector3(Vec3::NEG_Z).normalize_or_zero()
    }

    #[inline]
    pub fn up(&self) -> Vec3 {
        self.0.transform_vector3(Vec3::Y).normalize_or_zero()
    }

    #[inline]
    pub fn right(&self) -> Vec3 {
        self.0.transform_vector3(Vec3::X).normalize_or_zero()
    }

    /// Adds the provided vector to this transform's translation.
    #[inline]
    pub fn translate(&mut self, v: Vec3) {
        self.0.translation += Vec3A::from(v);
    }

    /// World-to-view matrix of a viewer placed at this transform.
    pub fn view_matrix(&self) -> Mat4 {
        let position = self.position();
        Mat4::look_to_rh(position, self.forward(), self.up())
    }
}
