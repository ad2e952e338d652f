//! The CPU acceleration structure: owns the per-model BLAS set, the live
//! trace snapshot, both probe bakers and the bake schedule.
//!
//! [`CpuAccelerationStructure::async_process_full`] is the only entry point
//! for a full rebake. It queues: one `Iterate` pass over the far lattice,
//! two shuffled `Iterate` passes over the near lattice (fenced), a `Copy`
//! pass and a `Blur` pass (each fenced). [`tick`] drains the queue one
//! batch at a time, dispatching column groups to the worker pool; batch
//! completions coalesce into a single upload flag.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use glam::Vec3;
use rand::seq::SliceRandom;

use crate::gi::accel::{
    BlasContext, ShadowMapBake, TraceContext, build_blas, build_trace_context,
};
use crate::gi::baker::{
    BakeEnvironment, BakerKind, CubeProc, GROUP_SIZE, GroupRecord, ProbeBaker, process_cube,
};
use crate::gi::packing::WangRng;
use crate::gi::probe::GridConfig;
use crate::scene::scene::Scene;
use crate::tasks::TaskCoordinator;

pub struct CpuAccelerationStructure {
    blas: Option<Arc<Vec<BlasContext>>>,
    context: Option<Arc<TraceContext>>,

    near: ProbeBaker,
    far: ProbeBaker,

    group_queue: VecDeque<GroupRecord>,
    last_batch: Vec<u32>,
    need_flush: Arc<AtomicBool>,

    shadow_map: ShadowMapBake,
}

impl Default for CpuAccelerationStructure {
    fn default() -> Self {
        Self::new()
    }
}

impl CpuAccelerationStructure {
    /// Structure over the default near/far lattices.
    #[must_use]
    pub fn new() -> Self {
        Self::with_grids(GridConfig::near(), GridConfig::far())
    }

    /// Structure over caller-chosen lattices (tests use small ones).
    #[must_use]
    pub fn with_grids(near: GridConfig, far: GridConfig) -> Self {
        Self {
            blas: None,
            context: None,
            near: ProbeBaker::new(near),
            far: ProbeBaker::new(far),
            group_queue: VecDeque::new(),
            last_batch: Vec::new(),
            need_flush: Arc::new(AtomicBool::new(false)),
            shadow_map: ShadowMapBake::default(),
        }
    }

    #[must_use]
    pub fn near_baker(&self) -> &ProbeBaker {
        &self.near
    }

    #[must_use]
    pub fn far_baker(&self) -> &ProbeBaker {
        &self.far
    }

    #[must_use]
    pub fn shadow_map(&self) -> &ShadowMapBake {
        &self.shadow_map
    }

    /// The current trace snapshot, if a scene has been built.
    #[must_use]
    pub fn context(&self) -> Option<&Arc<TraceContext>> {
        self.context.as_ref()
    }

    /// Builds per-model BLAS data from the scene's retained meshes, then
    /// refreshes the instance level.
    pub fn init_bvh(&mut self, scene: &Scene) {
        self.blas = Some(build_blas(scene));
        self.update_bvh(scene);
    }

    /// Rebuilds the instance list and TLAS from the visible nodes and
    /// publishes a fresh snapshot for ray queries. Must not race dispatched
    /// queries: callers cancel and drain parallel tasks around scene
    /// reloads.
    pub fn update_bvh(&mut self, scene: &Scene) {
        let Some(blas) = &self.blas else {
            return;
        };
        self.context = Some(build_trace_context(scene, blas));
    }

    /// Number of queued (undispatched) group records.
    #[must_use]
    pub fn queued_groups(&self) -> usize {
        self.group_queue.len()
    }

    /// Schedules a full rebake of both lattices. Cancels outstanding bake
    /// batches first.
    pub fn async_process_full(&mut self, coordinator: &TaskCoordinator) {
        self.group_queue.clear();
        self.last_batch.clear();
        coordinator.cancel_all_parallel_tasks();

        self.near.clear();
        self.far.clear();

        let groups_x = self.near.config().size_xy.div_ceil(GROUP_SIZE);
        let groups_z = groups_x;

        for x in 0..groups_x {
            for z in 0..groups_z {
                self.group_queue.push_back(GroupRecord {
                    x: x as i32,
                    z: z as i32,
                    proc: CubeProc::Iterate,
                    baker: BakerKind::Far,
                });
            }
        }

        for _pass in 0..2 {
            let mut coordinates: Vec<(usize, usize)> = (0..groups_x)
                .flat_map(|x| (0..groups_z).map(move |z| (x, z)))
                .collect();
            coordinates.shuffle(&mut rand::thread_rng());

            for (x, z) in coordinates {
                self.group_queue.push_back(GroupRecord {
                    x: x as i32,
                    z: z as i32,
                    proc: CubeProc::Iterate,
                    baker: BakerKind::Near,
                });
            }
            self.push_fence();
        }

        for proc in [CubeProc::Copy, CubeProc::Blur] {
            for x in 0..groups_x {
                for z in 0..groups_z {
                    self.group_queue.push_back(GroupRecord {
                        x: x as i32,
                        z: z as i32,
                        proc,
                        baker: BakerKind::Near,
                    });
                }
            }
            self.push_fence();
        }
    }

    fn push_fence(&mut self) {
        self.group_queue.push_back(GroupRecord {
            x: 0,
            z: 0,
            proc: CubeProc::Fence,
            baker: BakerKind::Near,
        });
    }

    /// Queues an `Iterate` refresh of the near columns within `radius` of a
    /// world position.
    pub fn request_update(&mut self, world_pos: Vec3, radius: f32) {
        let config = *self.near.config();
        let center = (world_pos - config.offset) / (GROUP_SIZE as f32 * config.unit);
        let reach = (radius / (GROUP_SIZE as f32 * config.unit)).ceil() as i32;
        let groups = config.size_xy.div_ceil(GROUP_SIZE) as i32;

        for x in center.x as i32 - reach..=center.x as i32 + reach {
            for z in center.z as i32 - reach..=center.z as i32 + reach {
                if x < 0 || z < 0 || x >= groups || z >= groups {
                    continue;
                }
                self.group_queue.push_back(GroupRecord {
                    x,
                    z,
                    proc: CubeProc::Iterate,
                    baker: BakerKind::Near,
                });
            }
        }
    }

    /// Per-frame pump. Returns true when a finished batch is ready for
    /// upload: the caller snapshots both lattices into GPU memory, and the
    /// flag is already cleared so several batches coalesce into one upload.
    pub fn tick(&mut self, scene: &Scene, coordinator: &TaskCoordinator) -> bool {
        if self.need_flush.swap(false, Ordering::AcqRel) {
            return true;
        }

        if !self.last_batch.is_empty() {
            if coordinator.is_all_tasks_complete(&self.last_batch) {
                self.last_batch.clear();
            }
            return false;
        }

        while let Some(front) = self.group_queue.front().copied() {
            if front.proc == CubeProc::Fence {
                if !coordinator.is_all_tasks_complete(&self.last_batch) {
                    break;
                }
                self.group_queue.pop_front();
                continue;
            }
            self.async_process_group(front, scene, coordinator);
            self.group_queue.pop_front();
        }

        false
    }

    /// Dispatches one column group as a parallel task. The worker iterates
    /// the full 16 x Z x 16 block (clamped to the lattice); the completion
    /// only sets the upload flag.
    fn async_process_group(
        &mut self,
        record: GroupRecord,
        scene: &Scene,
        coordinator: &TaskCoordinator,
    ) {
        let Some(ctx) = self.context.clone() else {
            return;
        };
        if ctx.instances.is_empty() {
            return;
        }

        let baker = match record.baker {
            BakerKind::Near => &self.near,
            BakerKind::Far => &self.far,
        };
        let grid = baker.grid().clone();
        let shadow = baker.shadow().clone();
        let env = BakeEnvironment::from_scene(scene);
        let seed = rand::random::<u32>() | 1;
        let need_flush = self.need_flush.clone();

        let start_x = record.x as usize * GROUP_SIZE;
        let start_z = record.z as usize * GROUP_SIZE;
        let proc = record.proc;

        let task_id = coordinator.add_parallel_task(
            move |_| {
                let config = *grid.config();
                let end_x = (start_x + GROUP_SIZE).min(config.size_xy);
                let end_z = (start_z + GROUP_SIZE).min(config.size_xy);
                let mut rng = WangRng::new(seed);

                for z in start_z..end_z {
                    for y in 0..config.size_z {
                        for x in start_x..end_x {
                            process_cube(&grid, &shadow, x, y, z, proc, &ctx, &env, &mut rng);
                        }
                    }
                }
            },
            Some(Box::new(move |_| {
                need_flush.store(true, Ordering::Release);
            })),
        );

        self.last_batch.push(task_id);
    }

    /// Dispatches the tiled sun shadow-map bake when the environment has a
    /// sun.
    pub fn gen_shadow_map(&mut self, scene: &Scene, coordinator: &TaskCoordinator) {
        let Some(ctx) = self.context.clone() else {
            return;
        };
        if ctx.instances.is_empty() || !scene.environment().has_sun {
            return;
        }

        let env = scene.environment();
        self.shadow_map.dispatch(
            &ctx,
            env.sun_view_projection(),
            env.sun_direction(),
            coordinator,
        );
    }
}
