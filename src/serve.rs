// © 2019 3D Robotics. License: Apache-2.0
use bytes::Bytes;
use futures::{StreamExt, TryStreamExt};
use http_body_util::StreamBody;
use hyper::{Response, body::{Body, Frame}, header};
use crate::encoder::Encoder;
use crate::error::{BoxError, Error, Report};

/// Serve an archive as a `hyper` response.
///
/// Content-Length is computed before any file is opened, so downloads
/// show real progress. Range requests are not supported: the archive is
/// produced strictly forward and cannot be resumed mid-stream.
pub fn zip_response(filename: &str, mut encoder: Encoder)
    -> Result<Response<impl Body<Data = Bytes, Error = BoxError>>, Error>
{
    encoder.prepare()?;
    let total = encoder.total_size()?;

    let stream = encoder.get_data()?
        .inspect_err(|err| {
            log::error!("Response stream error: {}", Report(err));
        })
        .map_err(|err| Box::new(err) as BoxError);

    let res = Response::builder()
        .header(header::CONTENT_TYPE, "application/zip")
        .header(header::CONTENT_LENGTH, total)
        .header(header::CONTENT_DISPOSITION, format!("attachment; filename=\"{}\"", filename))
        .body(StreamBody::new(stream.map(|chunk| chunk.map(Frame::data))))
        .unwrap();

    Ok(res)
}
