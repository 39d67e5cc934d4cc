//! OpenCL backend for the GPU workload.

use crate::error::BenchError;
use crate::workload::gpu::{ComputeBackend, VectorAddKernel};
use opencl3::command_queue::CommandQueue;
use opencl3::context::Context;
use opencl3::device::{get_all_devices, Device, CL_DEVICE_TYPE_GPU};
use opencl3::kernel::{ExecuteKernel, Kernel};
use opencl3::memory::{Buffer, ClMem, CL_MEM_READ_ONLY, CL_MEM_WRITE_ONLY};
use opencl3::program::Program;
use opencl3::types::{cl_float, CL_BLOCKING};
use rand::Rng;
use tracing::debug;

const VEC_ADD_SRC: &str = r#"
__kernel void vec_add(__global const float *a, __global const float *b, __global float *c) {
    int gid = get_global_id(0);
    c[gid] = a[gid] + b[gid];
}
"#;

fn device_error(stage: &str, e: impl std::fmt::Display) -> BenchError {
    BenchError::DeviceUnavailable(format!("{}: {}", stage, e))
}

pub struct OpenClBackend {
    device_name: String,
    context: Context,
    queue: CommandQueue,
    program: Program,
}

// SAFETY: OpenCL handles are thread-safe; the workload drives the queue
// from a single thread at a time.
unsafe impl Send for OpenClBackend {}
unsafe impl Sync for OpenClBackend {}

impl OpenClBackend {
    /// Pick the first GPU device and compile the kernel for it.
    pub fn discover() -> Result<Self, BenchError> {
        let device_ids = get_all_devices(CL_DEVICE_TYPE_GPU).map_err(|e| device_error("enumerate devices", e))?;
        let device_id = *device_ids
            .first()
            .ok_or_else(|| BenchError::DeviceUnavailable("no OpenCL GPU device".into()))?;

        let device = Device::new(device_id);
        let device_name = device.name().unwrap_or_else(|_| "OpenCL GPU".to_string());
        debug!("OpenCL device: {} ({})", device_name, device.vendor().unwrap_or_default());

        let context = Context::from_device(&device).map_err(|e| device_error("create context", e))?;
        let queue = CommandQueue::create_default_with_properties(&context, 0, 0)
            .map_err(|e| device_error("create command queue", e))?;
        let program = Program::create_and_build_from_source(&context, VEC_ADD_SRC, "")
            .map_err(|e| device_error("build vec_add", e))?;

        Ok(Self {
            device_name,
            context,
            queue,
            program,
        })
    }
}

impl ComputeBackend for OpenClBackend {
    fn device_name(&self) -> &str {
        &self.device_name
    }

    fn prepare<'a>(&'a self, chunk_length: usize) -> Result<Box<dyn VectorAddKernel + 'a>, BenchError> {
        let mut rng = rand::thread_rng();
        let host_a: Vec<cl_float> = (0..chunk_length).map(|_| rng.gen()).collect();
        let host_b: Vec<cl_float> = (0..chunk_length).map(|_| rng.gen()).collect();

        // SAFETY: buffers are created without a host pointer and filled by
        // blocking writes from slices of exactly `chunk_length` elements.
        let (a, b, c) = unsafe {
            let mut a = Buffer::<cl_float>::create(&self.context, CL_MEM_READ_ONLY, chunk_length, std::ptr::null_mut())
                .map_err(|e| device_error("allocate a", e))?;
            let mut b = Buffer::<cl_float>::create(&self.context, CL_MEM_READ_ONLY, chunk_length, std::ptr::null_mut())
                .map_err(|e| device_error("allocate b", e))?;
            let c = Buffer::<cl_float>::create(&self.context, CL_MEM_WRITE_ONLY, chunk_length, std::ptr::null_mut())
                .map_err(|e| device_error("allocate c", e))?;

            self.queue
                .enqueue_write_buffer(&mut a, CL_BLOCKING, 0, &host_a, &[])
                .map_err(|e| device_error("upload a", e))?;
            self.queue
                .enqueue_write_buffer(&mut b, CL_BLOCKING, 0, &host_b, &[])
                .map_err(|e| device_error("upload b", e))?;
            (a, b, c)
        };

        let kernel = Kernel::create(&self.program, "vec_add").map_err(|e| device_error("create kernel", e))?;

        Ok(Box::new(OpenClVectorAdd {
            queue: &self.queue,
            kernel,
            a,
            b,
            c,
            chunk_length,
        }))
    }
}

struct OpenClVectorAdd<'a> {
    queue: &'a CommandQueue,
    kernel: Kernel,
    a: Buffer<cl_float>,
    b: Buffer<cl_float>,
    c: Buffer<cl_float>,
    chunk_length: usize,
}

impl VectorAddKernel for OpenClVectorAdd<'_> {
    fn run_cycle(&mut self, repeats: usize) -> Result<(), BenchError> {
        for _ in 0..repeats {
            // SAFETY: the kernel signature is (float*, float*, float*) and the
            // global size equals the buffer length.
            unsafe {
                ExecuteKernel::new(&self.kernel)
                    .set_arg(&self.a.get())
                    .set_arg(&self.b.get())
                    .set_arg(&self.c.get())
                    .set_global_work_size(self.chunk_length)
                    .enqueue_nd_range(self.queue)
                    .map_err(|e| device_error("dispatch vec_add", e))?;
            }
        }
        self.queue.finish().map_err(|e| device_error("synchronize", e))
    }
}
