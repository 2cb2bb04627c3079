//! Current-frame point cloud node.
//!
//! A single entity tagged [`CurrentPointCloud`] and named after
//! `CURRENT_NODE_NAME` holds the displayed frame; every seek replaces it.
use bevy::prelude::*;
use bevy::render::mesh::PrimitiveTopology;
use bevy::render::render_asset::RenderAssetUsages;
use constants::render_settings::CURRENT_NODE_NAME;
use point_cloud_core::{PointCloud, PointCloudPlayer};

use crate::engine::playback::Playback;

#[derive(Resource)]
pub struct Player(pub PointCloudPlayer);

/// Unlit material shared by every frame so vertex colours show as recorded.
#[derive(Resource)]
pub struct PointCloudMaterial(pub Handle<StandardMaterial>);

#[derive(Component)]
pub struct CurrentPointCloud;

/// Point list mesh carrying the cloud's positions and colours.
pub fn point_cloud_mesh(cloud: &PointCloud) -> Mesh {
    let positions: Vec<[f32; 3]> = cloud.vertices.iter().map(|v| v.position()).collect();
    let colours: Vec<[f32; 4]> = cloud
        .vertices
        .iter()
        .map(|v| {
            let [r, g, b] = v.colour();
            [r, g, b, 1.0]
        })
        .collect();

    Mesh::new(PrimitiveTopology::PointList, RenderAssetUsages::RENDER_WORLD)
        .with_inserted_attribute(Mesh::ATTRIBUTE_POSITION, positions)
        .with_inserted_attribute(Mesh::ATTRIBUTE_COLOR, colours)
}

/// Seeks the player to the pending frame and swaps the displayed node.
pub fn show_requested_frame(
    mut commands: Commands,
    player: Res<Player>,
    mut playback: ResMut<Playback>,
    mut meshes: ResMut<Assets<Mesh>>,
    material: Option<Res<PointCloudMaterial>>,
    current: Query<Entity, With<CurrentPointCloud>>,
) {
    let Some(material) = material else {
        return;
    };
    let Some(index) = playback.take_request() else {
        return;
    };

    let cloud = match player.0.seek_frame(index) {
        Ok(cloud) => cloud,
        Err(e) => {
            warn!("Seek to frame {} failed: {}", index, e);
            return;
        }
    };

    for entity in &current {
        commands.entity(entity).despawn();
    }

    let Some(cloud) = cloud else {
        return;
    };
    debug!("Showing frame {} ({} points)", index, cloud.len());
    commands.spawn((
        Mesh3d(meshes.add(point_cloud_mesh(&cloud))),
        MeshMaterial3d(material.0.clone()),
        Transform::default(),
        Name::new(CURRENT_NODE_NAME),
        CurrentPointCloud,
    ));
}

#[cfg(test)]
mod tests {
    use super::*;
    use bevy::render::mesh::VertexAttributeValues;
    use point_cloud_core::PointCloudVertex;

    #[test]
    fn test_mesh_carries_positions_and_colours() {
        let cloud = PointCloud {
            vertices: vec![
                PointCloudVertex {
                    x: 1.0,
                    y: 2.0,
                    z: -3.0,
                    r: 0.5,
                    g: 0.25,
                    b: 1.0,
                },
                PointCloudVertex::default(),
            ],
            ..Default::default()
        };

        let mesh = point_cloud_mesh(&cloud);
        assert_eq!(mesh.primitive_topology(), PrimitiveTopology::PointList);
        assert_eq!(mesh.count_vertices(), 2);

        match mesh.attribute(Mesh::ATTRIBUTE_POSITION) {
            Some(VertexAttributeValues::Float32x3(positions)) => {
                assert_eq!(positions[0], [1.0, 2.0, -3.0]);
            }
            other => panic!("unexpected positions {:?}", other),
        }
        match mesh.attribute(Mesh::ATTRIBUTE_COLOR) {
            Some(VertexAttributeValues::Float32x4(colours)) => {
                assert_eq!(colours[0], [0.5, 0.25, 1.0, 1.0]);
            }
            other => panic!("unexpected colours {:?}", other),
        }
    }
}
