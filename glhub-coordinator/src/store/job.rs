//! Pipeline, job and pending-queue storage

use glhub_core::domain::job::PipelineJob;
use glhub_core::domain::pipeline::Pipeline;
use glhub_core::{JobId, PipelineId};

use super::State;

impl State {
    pub fn allocate_pipeline_id(&mut self) -> PipelineId {
        let id = self.next_pipeline_id;
        self.next_pipeline_id += 1;
        id
    }

    pub fn allocate_job_id(&mut self) -> JobId {
        let id = self.next_job_id;
        self.next_job_id += 1;
        id
    }

    /// Store a pipeline and index its jobs
    pub fn insert_pipeline(&mut self, pipeline: Pipeline) {
        for job in pipeline.jobs.values() {
            self.job_index.insert(job.id, pipeline.id);
        }
        self.pipelines.insert(pipeline.id, pipeline);
    }

    pub fn pipeline(&self, id: PipelineId) -> Option<&Pipeline> {
        self.pipelines.get(&id)
    }

    pub fn pipeline_mut(&mut self, id: PipelineId) -> Option<&mut Pipeline> {
        self.pipelines.get_mut(&id)
    }

    pub fn pipelines(&self) -> impl Iterator<Item = &Pipeline> {
        self.pipelines.values()
    }

    /// Pipelines that have not reached a terminal status
    pub fn active_pipeline_count(&self) -> usize {
        self.pipelines
            .values()
            .filter(|p| !p.status.is_terminal())
            .count()
    }

    pub fn pipeline_of_job(&self, job_id: JobId) -> Option<PipelineId> {
        self.job_index.get(&job_id).copied()
    }

    /// A job together with its pipeline
    pub fn job(&self, id: JobId) -> Option<(&Pipeline, &PipelineJob)> {
        let pipeline = self.pipelines.get(self.job_index.get(&id)?)?;
        let job = pipeline.job_by_id(id)?;
        Some((pipeline, job))
    }

    pub fn job_mut(&mut self, id: JobId) -> Option<&mut PipelineJob> {
        let pipeline_id = *self.job_index.get(&id)?;
        self.pipelines.get_mut(&pipeline_id)?.job_by_id_mut(id)
    }

    /// Append a job id to the pending queue
    pub fn enqueue_job(&mut self, id: JobId) {
        self.pending.push_back(id);
    }

    /// Pop the oldest pending job id
    pub fn dequeue_job(&mut self) -> Option<JobId> {
        self.pending.pop_front()
    }

    /// Drop every queued job belonging to `pipeline_id`
    pub fn purge_pending(&mut self, pipeline_id: PipelineId) -> usize {
        let before = self.pending.len();
        let index = &self.job_index;
        self.pending
            .retain(|id| index.get(id).copied() != Some(pipeline_id));
        before - self.pending.len()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_queued(&self, id: JobId) -> bool {
        self.pending.contains(&id)
    }
}
