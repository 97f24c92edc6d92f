use crate::connection::ReceivedFile;
use crate::error::Result;
use crate::receipt::ReceiptLog;

/// Close a fully received file and record it in the receipt log.
///
/// Returns the name the file was saved under.
pub fn finalize(output: ReceivedFile, receipts: &ReceiptLog) -> Result<String> {
    let ReceivedFile { file, filename, .. } = output;
    drop(file);
    receipts.append(&filename)?;
    Ok(filename)
}
