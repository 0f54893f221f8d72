//! PBS job script for one `generate_climos` run.

use crate::domain::QueueEntry;
use crate::ports::ScriptRenderer;

/// Virtual memory requested per processor, in MB.
pub const VMEM_PER_PPN_MB: u64 = 12_000;

/// Renders the `qsub` script. The test variant echoes the data-moving and
/// `generate_climos` commands instead of running them.
#[derive(Debug, Clone, Copy, Default)]
pub struct PbsScriptRenderer;

/// `generate_climos` reads its boolean flags as Python literals.
fn flag(value: bool) -> &'static str {
    if value { "True" } else { "False" }
}

impl ScriptRenderer for PbsScriptRenderer {
    fn render(&self, entry: &QueueEntry, test_job: bool) -> String {
        let p = &entry.params;
        // commands that do work are prefixed with `echo` in the test variant
        let run = if test_job { "echo " } else { "" };
        let verbose = if test_job { "" } else { "set -o verbose\n" };

        format!(
            r#"#PBS -l nodes=1:ppn={ppn}
#PBS -l vmem={vmem}mb
#PBS -l walltime={walltime}
#PBS -o {out}/logs
#PBS -e {out}/logs
#PBS -m abe
#PBS -N generate_climos:{file_name}
{verbose}
pbs_job_num=$(expr match "$PBS_JOBID" '\([0-9]*\)')
echo pbs_job_num = $pbs_job_num

# Set up the execution environment
module load netcdf-bin
module load cdo-bin
module list
source {venv}/bin/activate
which python

# Copy NetCDF file to $TMPDIR/climo/input
indir=$TMPDIR/climo/input
echo indir = $indir
{run}mkdir -p $indir && {run}cp {input} $indir
infile=$indir/{file_name}
echo infile = $infile

# Output directory is created by generate_climos
baseoutdir=$TMPDIR/climo/output
echo baseoutdir = $baseoutdir
outdir=$baseoutdir/$pbs_job_num
echo outdir = $outdir

# Generate climo means
{run}generate_climos -g {g} -v {v} -i {i} -o $outdir $infile

# Copy results to the final destination and remove the temporary input
{run}rsync -r $baseoutdir {out}
{run}rm $infile
"#,
            ppn = p.ppn,
            vmem = u64::from(p.ppn) * VMEM_PER_PPN_MB,
            walltime = p.walltime,
            out = p.output_directory,
            file_name = entry.input_file_name(),
            venv = p.py_venv,
            input = entry.input_path,
            g = flag(p.convert_longitudes),
            v = flag(p.split_vars),
            i = flag(p.split_intervals),
        )
    }
}
